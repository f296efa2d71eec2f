//! Applies broker events to a downstream service's store.

use crate::broker::{Message, Partition};
use crate::errors::{CompositeError, Result};
use crate::metrics_defs::EVENTS_CONSUMED;
use crate::scheduler::Scheduler;
use crate::store::{Store, StoredRecord};
use crate::types::{Event, EventType};
use serde::de::DeserializeOwned;
use shared::counter;
use std::sync::Arc;
use tokio::task::JoinSet;

pub struct EventConsumer<T> {
    store: Arc<dyn Store<T>>,
    scheduler: Scheduler,
}

impl<T> EventConsumer<T>
where
    T: StoredRecord + DeserializeOwned,
{
    /// `scheduler` runs the store operations. It must not be the pool the
    /// publishers of this consumer's channel use, or a full partition can
    /// starve both sides.
    pub fn new(store: Arc<dyn Store<T>>, scheduler: Scheduler) -> Self {
        EventConsumer { store, scheduler }
    }

    /// Processes one message. Failures are returned, never retried here.
    pub async fn handle(&self, message: &Message) -> Result<()> {
        let event: Event<T> = serde_json::from_slice(&message.payload).map_err(|e| {
            CompositeError::ProcessingFailure(format!("Failed to decode {} event: {e}", T::KIND))
        })?;

        tracing::debug!(
            kind = %T::KIND,
            key = event.key,
            created_at = %event.event_created_at,
            "Process message"
        );

        let store = self.store.clone();
        match event.event_type {
            EventType::Create => {
                let record = event.data.ok_or_else(|| {
                    CompositeError::ProcessingFailure(format!(
                        "CREATE event for key {} carries no data",
                        event.key
                    ))
                })?;
                self.scheduler
                    .submit(move || store.create(record).map(|_| ()))
                    .await
            }
            EventType::Delete => {
                let (key, detail_id) = (event.key, event.detail_id);
                self.scheduler
                    .submit(move || store.delete(key, detail_id))
                    .await
            }
        }
    }

    /// Drains every partition on its own task, in order, until the broker
    /// goes away. Dropping the returned set stops consumption.
    pub fn spawn(self: Arc<Self>, partitions: Vec<Partition>) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for partition in partitions {
            let consumer = self.clone();
            tasks.spawn(async move { consumer.drain(partition).await });
        }
        tasks
    }

    async fn drain(&self, mut partition: Partition) {
        tracing::info!(
            channel = %partition.channel,
            partition = partition.index,
            "consuming partition"
        );

        while let Some(message) = partition.rx.recv().await {
            let outcome = match self.handle(&message).await {
                Ok(()) => "ok",
                Err(e) => {
                    tracing::error!(
                        channel = %partition.channel,
                        partition = partition.index,
                        key = message.key,
                        error = %e,
                        "failed to process event"
                    );
                    "error"
                }
            };
            counter!(EVENTS_CONSUMED, "kind" => T::KIND.as_str(), "outcome" => outcome)
                .increment(1);
        }

        tracing::info!(
            channel = %partition.channel,
            partition = partition.index,
            "partition closed"
        );
    }
}
