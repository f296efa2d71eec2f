//! Fan-out read path.
//!
//! A composite read issues the product, recommendations and reviews calls
//! concurrently. The product is required: its failure is returned as-is and
//! the detail fetches still in flight are aborted. Details are optional: a
//! failed detail fetch is logged and replaced by an empty list.

use crate::errors::{CompositeError, Result};
use crate::integration::Integration;
use crate::metrics_defs::DETAIL_FETCH_DEGRADED;
use crate::types::{
    Product, ProductAggregate, ProductId, Recommendation, RecordKind, Review, ServiceAddresses,
};
use shared::counter;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};

enum Details {
    Recommendations(Result<Vec<Recommendation>>),
    Reviews(Result<Vec<Review>>),
}

pub struct Aggregator {
    integration: Arc<dyn Integration>,
    service_address: String,
}

impl Aggregator {
    pub fn new(integration: Arc<dyn Integration>, service_address: String) -> Self {
        Aggregator {
            integration,
            service_address,
        }
    }

    pub async fn get_aggregate(&self, product_id: ProductId) -> Result<ProductAggregate> {
        if product_id < 1 {
            return Err(CompositeError::InvalidInput(format!(
                "Invalid productId: {product_id}"
            )));
        }

        tracing::debug!(product_id, "Will get composite product info");

        // Dropping the set aborts whatever is still running, which covers
        // both a failed product and a caller that went away.
        let mut details = JoinSet::new();
        {
            let integration = self.integration.clone();
            details.spawn(async move {
                Details::Recommendations(integration.get_recommendations(product_id).await)
            });
        }
        {
            let integration = self.integration.clone();
            details.spawn(async move { Details::Reviews(integration.get_reviews(product_id).await) });
        }

        let product = match self.integration.get_product(product_id).await {
            Ok(product) => product,
            Err(e) => {
                details.abort_all();
                tracing::debug!(product_id, error = %e, "product lookup failed");
                return Err(e);
            }
        };

        let mut recommendations = Vec::new();
        let mut reviews = Vec::new();
        while let Some(joined) = details.join_next().await {
            match joined {
                Ok(Details::Recommendations(result)) => {
                    recommendations = degrade(RecordKind::Recommendation, product_id, result);
                }
                Ok(Details::Reviews(result)) => {
                    reviews = degrade(RecordKind::Review, product_id, result);
                }
                Err(e) => report_join_error(product_id, e),
            }
        }

        let aggregate = merge(product, recommendations, reviews, &self.service_address);
        tracing::debug!(
            product_id,
            recommendations = aggregate.recommendations.len(),
            reviews = aggregate.reviews.len(),
            "created composite product"
        );
        Ok(aggregate)
    }
}

fn degrade<T>(kind: RecordKind, product_id: ProductId, result: Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::warn!(%kind, product_id, error = %e, "detail fetch failed, returning no records");
        counter!(DETAIL_FETCH_DEGRADED, "kind" => kind.as_str()).increment(1);
        Vec::new()
    })
}

// The panicked task's kind is unknown here; its list stays empty.
fn report_join_error(product_id: ProductId, e: JoinError) {
    tracing::error!(product_id, error = %e, "detail fetch task failed");
    counter!(DETAIL_FETCH_DEGRADED, "kind" => "unknown").increment(1);
}

/// Builds the aggregate from already fetched parts.
///
/// `pro` is taken from the product, `rec` and `rev` from the first record of
/// each list, falling back to an empty string.
pub fn merge(
    product: Product,
    recommendations: Vec<Recommendation>,
    reviews: Vec<Review>,
    service_address: &str,
) -> ProductAggregate {
    let service_addresses = ServiceAddresses {
        cmp: service_address.to_string(),
        pro: product.service_address,
        rev: reviews
            .first()
            .map(|r| r.service_address.clone())
            .unwrap_or_default(),
        rec: recommendations
            .first()
            .map(|r| r.service_address.clone())
            .unwrap_or_default(),
    };

    ProductAggregate {
        product_id: product.product_id,
        name: product.name,
        weight: product.weight,
        recommendations: recommendations.iter().map(Into::into).collect(),
        reviews: reviews.iter().map(Into::into).collect(),
        service_addresses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockIntegration, product, recommendation, review};
    use crate::types::{RecommendationSummary, ReviewSummary};
    use std::time::{Duration, Instant};

    fn aggregator(integration: Arc<MockIntegration>) -> Aggregator {
        Aggregator::new(integration, "composite-1:7000".into())
    }

    fn with_address<T: crate::store::StoredRecord>(mut record: T, address: &str) -> T {
        record.set_service_address(address);
        record
    }

    #[tokio::test]
    async fn test_invalid_id_makes_no_calls() {
        let integration = Arc::new(MockIntegration::new(Ok(product(1))));
        let aggregator = aggregator(integration.clone());

        for id in [0, -1] {
            assert_eq!(
                aggregator.get_aggregate(id).await,
                Err(CompositeError::InvalidInput(format!("Invalid productId: {id}")))
            );
        }
        assert_eq!(integration.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_full_aggregate() {
        let integration = Arc::new(
            MockIntegration::new(Ok(with_address(product(1), "product-1")))
                .with_recommendations(Ok(vec![
                    with_address(recommendation(1, 1), "rec-1"),
                    with_address(recommendation(1, 2), "rec-2"),
                ]))
                .with_reviews(Ok(vec![with_address(review(1, 1), "rev-1")])),
        );

        let aggregate = aggregator(integration).get_aggregate(1).await.unwrap();

        assert_eq!(aggregate.product_id, 1);
        assert_eq!(aggregate.name, "n");
        assert_eq!(aggregate.weight, 10);
        assert_eq!(
            aggregate.recommendations,
            vec![
                RecommendationSummary::from(&recommendation(1, 1)),
                RecommendationSummary::from(&recommendation(1, 2)),
            ]
        );
        assert_eq!(aggregate.reviews, vec![ReviewSummary::from(&review(1, 1))]);
        assert_eq!(
            aggregate.service_addresses,
            ServiceAddresses {
                cmp: "composite-1:7000".into(),
                pro: "product-1".into(),
                rev: "rev-1".into(),
                rec: "rec-1".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_calls_are_concurrent() {
        let delay = Duration::from_millis(200);
        let integration = Arc::new(
            MockIntegration::new(Ok(product(1)))
                .with_delay(RecordKind::Product, delay)
                .with_delay(RecordKind::Recommendation, delay)
                .with_delay(RecordKind::Review, delay),
        );

        let started = Instant::now();
        aggregator(integration).get_aggregate(1).await.unwrap();
        assert!(started.elapsed() < delay * 2);
    }

    #[tokio::test]
    async fn test_product_failure_is_returned_unchanged() {
        let integration = Arc::new(MockIntegration::new(Err(CompositeError::Unexpected {
            status: Some(503),
            message: "unavailable".into(),
        })));

        assert_eq!(
            aggregator(integration).get_aggregate(1).await,
            Err(CompositeError::Unexpected {
                status: Some(503),
                message: "unavailable".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_not_found_scenario() {
        let integration = Arc::new(
            MockIntegration::new(Err(CompositeError::NotFound(
                "No product found for productId: 13".into(),
            )))
            .with_recommendations(Ok(vec![recommendation(13, 1)]))
            .with_delay(RecordKind::Product, Duration::from_millis(50))
            .with_delay(RecordKind::Recommendation, Duration::from_millis(200))
            .with_delay(RecordKind::Review, Duration::from_millis(200)),
        );

        let result = aggregator(integration.clone()).get_aggregate(13).await;
        assert_eq!(
            result,
            Err(CompositeError::NotFound(
                "No product found for productId: 13".into()
            ))
        );

        // The slow detail fetches were started, then aborted.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(integration.calls(RecordKind::Recommendation), 1);
        assert_eq!(integration.completed(RecordKind::Recommendation), 0);
        assert_eq!(integration.completed(RecordKind::Review), 0);
    }

    #[tokio::test]
    async fn test_detail_failure_degrades_to_empty() {
        let integration = Arc::new(
            MockIntegration::new(Ok(product(1)))
                .with_recommendations(Err(CompositeError::unexpected("connection refused")))
                .with_reviews(Ok(vec![with_address(review(1, 1), "rev-1")])),
        );

        let aggregate = aggregator(integration).get_aggregate(1).await.unwrap();
        assert!(aggregate.recommendations.is_empty());
        assert_eq!(aggregate.reviews.len(), 1);
        assert_eq!(aggregate.service_addresses.rec, "");
        assert_eq!(aggregate.service_addresses.rev, "rev-1");
    }

    #[tokio::test]
    async fn test_review_timeout_scenario() {
        // Product {1,"n",10}, two recommendations, the review call times out.
        let integration = Arc::new(
            MockIntegration::new(Ok(product(1)))
                .with_recommendations(Ok(vec![recommendation(1, 1), recommendation(1, 2)]))
                .with_reviews(Err(CompositeError::unexpected(
                    "Upstream timeout for review",
                ))),
        );

        let aggregate = aggregator(integration).get_aggregate(1).await.unwrap();
        assert_eq!((aggregate.product_id, aggregate.name.as_str(), aggregate.weight), (1, "n", 10));
        assert_eq!(aggregate.recommendations.len(), 2);
        assert!(aggregate.reviews.is_empty());
    }

    #[test]
    fn test_merge_without_details() {
        let aggregate = merge(with_address(product(5), "p"), vec![], vec![], "c");
        assert_eq!(
            aggregate.service_addresses,
            ServiceAddresses {
                cmp: "c".into(),
                pro: "p".into(),
                rev: String::new(),
                rec: String::new(),
            }
        );
        assert!(aggregate.recommendations.is_empty());
        assert!(aggregate.reviews.is_empty());
    }
}
