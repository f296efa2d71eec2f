//! Event-driven write path. Writes are acknowledged once the broker has
//! accepted the event; downstream services apply them later.

use crate::broker::Message;
use crate::errors::{CompositeError, Result};
use crate::integration::Integration;
use crate::metrics_defs::EVENTS_PUBLISHED;
use crate::scheduler::Scheduler;
use crate::types::{
    DeleteTarget, Event, EventType, Product, ProductAggregate, ProductId, Recommendation, Record,
    RecordKind, Review,
};
use serde::Serialize;
use shared::counter;
use std::sync::Arc;

pub struct WriteCoordinator {
    integration: Arc<dyn Integration>,
    scheduler: Scheduler,
}

impl WriteCoordinator {
    pub fn new(integration: Arc<dyn Integration>, scheduler: Scheduler) -> Self {
        WriteCoordinator {
            integration,
            scheduler,
        }
    }

    pub async fn create(&self, record: Record) -> Result<()> {
        let kind = record.kind();
        let key = record.product_id();
        let payload = match record {
            Record::Product(product) => serialize(&Event::create(key, product)),
            Record::Recommendation(recommendation) => {
                serialize(&Event::create(key, recommendation))
            }
            Record::Review(review) => serialize(&Event::create(key, review)),
        }?;

        self.publish(kind, EventType::Create, Message { key, payload }).await
    }

    pub async fn delete(&self, target: DeleteTarget) -> Result<()> {
        if target.product_id < 1 {
            return Err(CompositeError::InvalidInput(format!(
                "Invalid productId: {}",
                target.product_id
            )));
        }
        if let Some(detail_id) = target.detail_id {
            check_detail_id(target.kind, detail_id)?;
        }

        let key = target.product_id;
        let payload = serialize(&Event::<()>::delete(key, target.detail_id))?;

        self.publish(target.kind, EventType::Delete, Message { key, payload })
            .await
    }

    /// Publishes the product, then each recommendation, then each review,
    /// waiting for every acknowledgement before sending the next event.
    pub async fn create_aggregate(&self, body: ProductAggregate) -> Result<()> {
        let product_id = body.product_id;
        tracing::debug!(product_id, "Will create a new composite entity");

        self.create(Record::Product(Product {
            product_id,
            name: body.name,
            weight: body.weight,
            service_address: String::new(),
        }))
        .await?;

        for summary in body.recommendations {
            self.create(Record::Recommendation(Recommendation {
                product_id,
                recommendation_id: summary.recommendation_id,
                author: summary.author,
                rate: summary.rate,
                content: summary.content,
                service_address: String::new(),
            }))
            .await?;
        }

        for summary in body.reviews {
            self.create(Record::Review(Review {
                product_id,
                review_id: summary.review_id,
                author: summary.author,
                subject: summary.subject,
                content: summary.content,
                service_address: String::new(),
            }))
            .await?;
        }

        tracing::debug!(product_id, "composite entities created");
        Ok(())
    }

    pub async fn delete_aggregate(&self, product_id: ProductId) -> Result<()> {
        tracing::debug!(product_id, "Will delete a product aggregate");

        for kind in RecordKind::ALL {
            self.delete(DeleteTarget::all(kind, product_id)).await?;
        }

        tracing::debug!(product_id, "product aggregate deleted");
        Ok(())
    }

    async fn publish(&self, kind: RecordKind, event_type: EventType, message: Message) -> Result<()> {
        let key = message.key;
        let event_type: &'static str = event_type.into();
        let integration = self.integration.clone();
        self.scheduler
            .submit(move || integration.publish(kind, message))
            .await?;

        counter!(EVENTS_PUBLISHED, "channel" => kind.channel(), "event_type" => event_type)
            .increment(1);
        tracing::debug!(channel = kind.channel(), key, event_type, "event published");
        Ok(())
    }
}

fn check_detail_id(kind: RecordKind, detail_id: i32) -> Result<()> {
    if !kind.has_detail_id() {
        return Err(CompositeError::InvalidInput(format!(
            "A {kind} is identified by its productId alone, got detail id {detail_id}"
        )));
    }
    if detail_id < 1 {
        return Err(CompositeError::InvalidInput(format!(
            "Invalid {kind} id: {detail_id}"
        )));
    }
    Ok(())
}

fn serialize<T: Serialize>(event: &Event<T>) -> Result<hyper::body::Bytes> {
    serde_json::to_vec(event)
        .map(Into::into)
        .map_err(|e| CompositeError::unexpected(format!("failed to serialize event: {e}")))
}
