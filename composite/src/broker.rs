//! Message broker abstraction and the in-process partitioned broker.
//!
//! Every channel is split into a fixed number of partitions. A message goes
//! to partition `key mod partitions`, and each partition is a single ordered
//! queue, so messages sharing a key are delivered in publish order. There is
//! no ordering across keys that land on different partitions.

use crate::config::BrokerConfig;
use crate::types::ProductId;
use hyper::body::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Channel {channel} already has a subscriber")]
    AlreadySubscribed { channel: String },

    #[error("Partition {partition} of channel {channel} is closed")]
    PartitionClosed { channel: String, partition: usize },
}

/// A serialized event plus the key it is partitioned by.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub key: ProductId,
    pub payload: Bytes,
}

/// Publishing may block (full partitions, network round trips), so callers
/// on the async path go through the scheduler.
pub trait MessageBroker: Send + Sync {
    fn publish(&self, channel: &str, message: Message) -> Result<(), BrokerError>;
}

/// Receiving half of one partition.
pub struct Partition {
    pub channel: String,
    pub index: usize,
    pub rx: mpsc::Receiver<Message>,
}

struct Channel {
    senders: Vec<mpsc::Sender<Message>>,
    receivers: Option<Vec<mpsc::Receiver<Message>>>,
}

pub struct InMemoryBroker {
    channels: HashMap<String, Mutex<Channel>>,
}

impl InMemoryBroker {
    pub fn new<'a>(config: &BrokerConfig, channel_names: impl IntoIterator<Item = &'a str>) -> Self {
        let channels = channel_names
            .into_iter()
            .map(|name| {
                let (senders, receivers): (Vec<_>, Vec<_>) = (0..config.partitions)
                    .map(|_| mpsc::channel(config.partition_capacity))
                    .unzip();
                let channel = Channel {
                    senders,
                    receivers: Some(receivers),
                };
                (name.to_string(), Mutex::new(channel))
            })
            .collect();

        InMemoryBroker { channels }
    }

    /// Hands out every partition of `channel`. A channel has exactly one
    /// subscriber.
    pub fn subscribe(&self, channel: &str) -> Result<Vec<Partition>, BrokerError> {
        let mut entry = self
            .channels
            .get(channel)
            .ok_or_else(|| BrokerError::UnknownChannel(channel.to_string()))?
            .lock();

        let receivers = entry
            .receivers
            .take()
            .ok_or_else(|| BrokerError::AlreadySubscribed {
                channel: channel.to_string(),
            })?;

        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(index, rx)| Partition {
                channel: channel.to_string(),
                index,
                rx,
            })
            .collect())
    }
}

fn partition_for(key: ProductId, partitions: usize) -> usize {
    i64::from(key).rem_euclid(partitions as i64) as usize
}

impl MessageBroker for InMemoryBroker {
    fn publish(&self, channel: &str, message: Message) -> Result<(), BrokerError> {
        // Clone the sender so the channel lock isn't held while blocking on
        // a full partition.
        let (sender, partition) = {
            let entry = self
                .channels
                .get(channel)
                .ok_or_else(|| BrokerError::UnknownChannel(channel.to_string()))?
                .lock();
            let partition = partition_for(message.key, entry.senders.len());
            (entry.senders[partition].clone(), partition)
        };

        tracing::debug!(channel, partition, key = message.key, "publishing message");

        sender
            .blocking_send(message)
            .map_err(|_| BrokerError::PartitionClosed {
                channel: channel.to_string(),
                partition,
            })
    }
}
