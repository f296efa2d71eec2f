//! Record storage used by event consumers.

use crate::errors::{CompositeError, Result};
use crate::types::{Product, ProductId, Recommendation, RecordKind, Review};
use indexmap::IndexMap;
use parking_lot::RwLock;

/// A record owned by one downstream service.
pub trait StoredRecord: Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    fn product_id(&self) -> ProductId;

    /// Identifies the record among those sharing a product id. Products have
    /// none; there is at most one per product id.
    fn detail_id(&self) -> Option<i32>;

    fn set_service_address(&mut self, address: &str);
}

impl StoredRecord for Product {
    const KIND: RecordKind = RecordKind::Product;

    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn detail_id(&self) -> Option<i32> {
        None
    }

    fn set_service_address(&mut self, address: &str) {
        self.service_address = address.to_string();
    }
}

impl StoredRecord for Recommendation {
    const KIND: RecordKind = RecordKind::Recommendation;

    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn detail_id(&self) -> Option<i32> {
        Some(self.recommendation_id)
    }

    fn set_service_address(&mut self, address: &str) {
        self.service_address = address.to_string();
    }
}

impl StoredRecord for Review {
    const KIND: RecordKind = RecordKind::Review;

    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn detail_id(&self) -> Option<i32> {
        Some(self.review_id)
    }

    fn set_service_address(&mut self, address: &str) {
        self.service_address = address.to_string();
    }
}

/// Blocking storage interface. Callers on the async path go through the
/// scheduler.
pub trait Store<T: StoredRecord>: Send + Sync {
    /// Fails with `InvalidInput` when a record with the same key exists.
    fn create(&self, record: T) -> Result<T>;

    /// Removes one record, or every record of `product_id` when `detail_id`
    /// is absent. Removing nothing is not an error.
    fn delete(&self, product_id: ProductId, detail_id: Option<i32>) -> Result<()>;

    /// Records of `product_id` in insertion order.
    fn find(&self, product_id: ProductId) -> Result<Vec<T>>;
}

type Key = (ProductId, Option<i32>);

pub struct InMemoryStore<T> {
    records: RwLock<IndexMap<Key, T>>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        InMemoryStore {
            records: RwLock::new(IndexMap::new()),
        }
    }
}

impl<T: StoredRecord> InMemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn check_product_id(product_id: ProductId) -> Result<()> {
    if product_id < 1 {
        return Err(CompositeError::InvalidInput(format!(
            "Invalid productId: {product_id}"
        )));
    }
    Ok(())
}

fn duplicate_key(kind: RecordKind, (product_id, detail_id): Key) -> CompositeError {
    let message = match (kind, detail_id) {
        (RecordKind::Recommendation, Some(id)) => {
            format!("Duplicate key, Product Id: {product_id}, Recommendation Id: {id}")
        }
        (RecordKind::Review, Some(id)) => {
            format!("Duplicate key, Product Id: {product_id}, Review Id: {id}")
        }
        _ => format!("Duplicate key, Product Id: {product_id}"),
    };
    CompositeError::InvalidInput(message)
}

impl<T: StoredRecord> Store<T> for InMemoryStore<T> {
    fn create(&self, record: T) -> Result<T> {
        check_product_id(record.product_id())?;

        let key = (record.product_id(), record.detail_id());
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(duplicate_key(T::KIND, key));
        }
        records.insert(key, record.clone());

        tracing::debug!(kind = %T::KIND, product_id = key.0, detail_id = ?key.1, "created record");
        Ok(record)
    }

    fn delete(&self, product_id: ProductId, detail_id: Option<i32>) -> Result<()> {
        check_product_id(product_id)?;
        if let (Some(id), false) = (detail_id, T::KIND.has_detail_id()) {
            return Err(CompositeError::InvalidInput(format!(
                "A {} has no detail id, got {id} for Product Id: {product_id}",
                T::KIND
            )));
        }

        let mut records = self.records.write();
        let before = records.len();
        match detail_id {
            Some(_) => {
                records.shift_remove(&(product_id, detail_id));
            }
            None => records.retain(|(id, _), _| *id != product_id),
        }

        tracing::debug!(
            kind = %T::KIND,
            product_id,
            deleted = before - records.len(),
            "deleted records"
        );
        Ok(())
    }

    fn find(&self, product_id: ProductId) -> Result<Vec<T>> {
        check_product_id(product_id)?;

        Ok(self
            .records
            .read()
            .iter()
            .filter(|((id, _), _)| *id == product_id)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{product, review};

    #[test]
    fn test_create_and_find() {
        let store = InMemoryStore::<Review>::new();
        store.create(review(1, 2)).unwrap();
        store.create(review(1, 1)).unwrap();
        store.create(review(2, 1)).unwrap();

        let found = store.find(1).unwrap();
        assert_eq!(
            found.iter().map(|r| r.review_id).collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert!(store.find(3).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_key() {
        let store = InMemoryStore::<Review>::new();
        store.create(review(1, 1)).unwrap();
        assert_eq!(
            store.create(review(1, 1)),
            Err(CompositeError::InvalidInput(
                "Duplicate key, Product Id: 1, Review Id: 1".into()
            ))
        );

        let store = InMemoryStore::<Product>::new();
        store.create(product(1)).unwrap();
        assert_eq!(
            store.create(product(1)),
            Err(CompositeError::InvalidInput("Duplicate key, Product Id: 1".into()))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_product_id() {
        let store = InMemoryStore::<Product>::new();
        assert!(matches!(
            store.create(product(0)),
            Err(CompositeError::InvalidInput(_))
        ));
        assert!(matches!(
            store.delete(-1, None),
            Err(CompositeError::InvalidInput(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete() {
        let store = InMemoryStore::<Review>::new();
        for (product_id, review_id) in [(1, 1), (1, 2), (1, 3), (2, 1)] {
            store.create(review(product_id, review_id)).unwrap();
        }

        store.delete(1, Some(2)).unwrap();
        assert_eq!(
            store.find(1).unwrap().iter().map(|r| r.review_id).collect::<Vec<_>>(),
            vec![1, 3]
        );

        store.delete(1, None).unwrap();
        assert!(store.find(1).unwrap().is_empty());
        assert_eq!(store.len(), 1);

        // Deleting what isn't there is fine.
        store.delete(1, None).unwrap();
        store.delete(7, Some(1)).unwrap();
    }

    #[test]
    fn test_product_delete_with_detail_id() {
        let store = InMemoryStore::<Product>::new();
        store.create(product(1)).unwrap();

        assert!(matches!(
            store.delete(1, Some(99)),
            Err(CompositeError::InvalidInput(_))
        ));
        assert_eq!(store.len(), 1);

        store.delete(1, None).unwrap();
        assert!(store.is_empty());
    }
}
