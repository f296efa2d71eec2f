use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status, route.",
};

pub const DETAIL_FETCH_DEGRADED: MetricDef = MetricDef {
    name: "aggregate.detail.degraded",
    metric_type: MetricType::Counter,
    description: "Detail fetches replaced by an empty list. Tagged with kind.",
};

pub const EVENTS_PUBLISHED: MetricDef = MetricDef {
    name: "events.published",
    metric_type: MetricType::Counter,
    description: "Events accepted by the broker. Tagged with channel, event_type.",
};

pub const EVENTS_CONSUMED: MetricDef = MetricDef {
    name: "events.consumed",
    metric_type: MetricType::Counter,
    description: "Events processed by a consumer. Tagged with kind, outcome.",
};

pub const SCHEDULER_QUEUED: MetricDef = MetricDef {
    name: "scheduler.queued",
    metric_type: MetricType::Gauge,
    description: "Blocking jobs waiting for a worker",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    DETAIL_FETCH_DEGRADED,
    EVENTS_PUBLISHED,
    EVENTS_CONSUMED,
    SCHEDULER_QUEUED,
];
