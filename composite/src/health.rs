use crate::integration::Integration;
use crate::types::RecordKind;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ComponentHealth {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HealthReport {
    /// `UP` only when every component is up.
    pub status: Status,
    pub components: IndexMap<String, ComponentHealth>,
}

pub struct HealthAggregator {
    integration: Arc<dyn Integration>,
}

impl HealthAggregator {
    pub fn new(integration: Arc<dyn Integration>) -> Self {
        HealthAggregator { integration }
    }

    /// Probes every downstream service in parallel. Never fails; a failed
    /// probe only marks its own component down.
    pub async fn get_health(&self) -> HealthReport {
        let (product, recommendation, review) = tokio::join!(
            self.check(RecordKind::Product),
            self.check(RecordKind::Recommendation),
            self.check(RecordKind::Review),
        );

        let components: IndexMap<String, ComponentHealth> = [product, recommendation, review]
            .into_iter()
            .collect();
        let status = if components.values().all(|c| c.status == Status::Up) {
            Status::Up
        } else {
            Status::Down
        };

        HealthReport { status, components }
    }

    async fn check(&self, kind: RecordKind) -> (String, ComponentHealth) {
        let health = match self.integration.probe(kind).await {
            Ok(()) => ComponentHealth {
                status: Status::Up,
                error: None,
            },
            Err(e) => {
                tracing::warn!(%kind, error = %e, "health probe failed");
                ComponentHealth {
                    status: Status::Down,
                    error: Some(e.to_string()),
                }
            }
        };
        (kind.to_string(), health)
    }
}
