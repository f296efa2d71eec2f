use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Worker pool size must be at least 1")]
    EmptyWorkerPool,

    #[error("Worker pool queue depth must be at least 1")]
    EmptyWorkerQueue,

    #[error("Timeout for {0} must be greater than 0")]
    InvalidTimeout(&'static str),

    #[error("Broker must have at least one partition")]
    NoPartitions,

    #[error("Broker partition capacity must be at least 1")]
    EmptyPartition,

    #[error("Upstream URL for {0} cannot be a base URL")]
    InvalidUpstreamUrl(&'static str),
}

/// Composite service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for client requests
    pub listener: Listener,
    /// Listener for liveness and readiness probes
    pub admin_listener: Listener,
    /// Address reported as `cmp` in aggregate responses. Defaults to
    /// `host:port` of the main listener.
    #[serde(default)]
    pub service_address: Option<String>,
    pub upstreams: Upstreams,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub worker_pool: WorkerPool,
    #[serde(default)]
    pub broker: BrokerConfig,
    pub local_services: LocalServices,
}

impl Config {
    /// Validates the composite configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.upstreams.validate()?;
        self.timeouts.validate()?;
        self.worker_pool.validate()?;
        self.broker.validate()?;
        self.local_services.validate()?;
        Ok(())
    }

    pub fn service_address(&self) -> String {
        self.service_address
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.listener.host, self.listener.port))
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Base URLs of the three downstream services.
///
/// Note: Uses the `url::Url` type so invalid URLs are rejected during
/// deserialization.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Upstreams {
    pub product: Url,
    pub recommendation: Url,
    pub review: Url,
}

impl Upstreams {
    fn validate(&self) -> Result<(), ValidationError> {
        for (name, url) in [
            ("product", &self.product),
            ("recommendation", &self.recommendation),
            ("review", &self.review),
        ] {
            if url.cannot_be_a_base() {
                return Err(ValidationError::InvalidUpstreamUrl(name));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Timeouts {
    /// Applies independently to every outbound data call.
    pub http_timeout_ms: u64,
    /// Applies independently to every health probe.
    pub health_timeout_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            http_timeout_ms: 5_000,
            health_timeout_ms: 2_000,
        }
    }
}

impl Timeouts {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.http_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("http"));
        }
        if self.health_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("health"));
        }
        Ok(())
    }
}

/// Sizing of the pool blocking work is dispatched onto.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct WorkerPool {
    pub size: usize,
    pub queue_depth: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool {
            size: 10,
            queue_depth: 100,
        }
    }
}

impl WorkerPool {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.size == 0 {
            return Err(ValidationError::EmptyWorkerPool);
        }
        if self.queue_depth == 0 {
            return Err(ValidationError::EmptyWorkerQueue);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BrokerConfig {
    /// Number of ordered partitions per channel.
    pub partitions: usize,
    /// Messages a partition buffers before publishers block.
    #[serde(default = "default_partition_capacity")]
    pub partition_capacity: usize,
}

fn default_partition_capacity() -> usize {
    1024
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            partitions: 2,
            partition_capacity: default_partition_capacity(),
        }
    }
}

impl BrokerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.partitions == 0 {
            return Err(ValidationError::NoPartitions);
        }
        if self.partition_capacity == 0 {
            return Err(ValidationError::EmptyPartition);
        }
        Ok(())
    }
}

/// Downstream services run inside this process on top of in-memory stores.
/// They consume the broker channels and serve the read endpoints the
/// upstream URLs point at.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LocalServices {
    pub product: Listener,
    pub recommendation: Listener,
    pub review: Listener,
    /// Pool the store writes of every local service run on. Kept apart from
    /// the composite's own pool.
    #[serde(default)]
    pub worker_pool: WorkerPool,
}

impl LocalServices {
    fn validate(&self) -> Result<(), ValidationError> {
        self.product.validate()?;
        self.recommendation.validate()?;
        self.review.validate()?;
        self.worker_pool.validate()
    }
}
