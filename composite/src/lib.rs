pub mod aggregator;
pub mod api;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod core_service;
pub mod errors;
pub mod health;
mod http;
pub mod integration;
pub mod metrics_defs;
mod normalizer;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod writer;

#[cfg(test)]
mod testutils;

use aggregator::Aggregator;
use api::CompositeService;
use broker::InMemoryBroker;
use config::{Config, Listener};
use consumer::EventConsumer;
use core_service::CoreService;
use errors::ServerError;
use health::HealthAggregator;
use integration::{HttpIntegration, Integration};
use scheduler::Scheduler;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use store::{InMemoryStore, Store, StoredRecord};
use tokio::task::JoinSet;
use types::{Product, Recommendation, RecordKind, Review};
use writer::WriteCoordinator;

pub async fn run(config: Config) -> Result<(), ServerError> {
    config.validate()?;

    let broker = Arc::new(InMemoryBroker::new(
        &config.broker,
        RecordKind::ALL.iter().map(|kind| kind.channel()),
    ));

    let local = &config.local_services;
    let local_scheduler = Scheduler::new(&local.worker_pool).map_err(startup)?;
    let (product_service, _product_consumers) =
        local_service::<Product>(&broker, &local.product, local_scheduler.clone())?;
    let (recommendation_service, _recommendation_consumers) =
        local_service::<Recommendation>(&broker, &local.recommendation, local_scheduler.clone())?;
    let (review_service, _review_consumers) =
        local_service::<Review>(&broker, &local.review, local_scheduler)?;

    let integration: Arc<dyn Integration> = Arc::new(HttpIntegration::new(
        config.upstreams.clone(),
        config.timeouts.clone(),
        broker,
    ));
    let scheduler = Scheduler::new(&config.worker_pool).map_err(startup)?;
    let composite_service = CompositeService::new(
        Aggregator::new(integration.clone(), config.service_address()),
        WriteCoordinator::new(integration.clone(), scheduler),
        HealthAggregator::new(integration),
    );

    let ready = Arc::new(AtomicBool::new(false));
    let admin_service = AdminService::<_, ServerError>::new({
        let ready = ready.clone();
        move || ready.load(Ordering::Relaxed)
    });

    tracing::info!(
        service_address = %config.service_address(),
        "starting composite service"
    );
    ready.store(true, Ordering::Relaxed);

    tokio::try_join!(
        serve(&config.listener, composite_service),
        serve(&config.admin_listener, admin_service),
        serve(&local.product, product_service),
        serve(&local.recommendation, recommendation_service),
        serve(&local.review, review_service),
    )?;

    Ok(())
}

async fn serve<S>(listener: &Listener, service: S) -> Result<(), ServerError>
where
    S: hyper::service::Service<
            hyper::Request<hyper::body::Incoming>,
            Response = hyper::Response<
                http_body_util::combinators::BoxBody<hyper::body::Bytes, ServerError>,
            >,
            Error = ServerError,
        > + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    run_http_service(&listener.host, listener.port, service).await
}

/// Starts the consumers of one downstream kind and returns the service
/// serving its reads. Consumption stops when the returned set is dropped.
fn local_service<T>(
    broker: &InMemoryBroker,
    listener: &Listener,
    scheduler: Scheduler,
) -> Result<(CoreService<T>, JoinSet<()>), ServerError>
where
    T: StoredRecord + Serialize + DeserializeOwned,
{
    let store: Arc<dyn Store<T>> = Arc::new(InMemoryStore::<T>::new());
    let partitions = broker.subscribe(T::KIND.channel()).map_err(startup)?;
    let consumers = Arc::new(EventConsumer::new(store.clone(), scheduler)).spawn(partitions);

    let service_address = format!("{}:{}", listener.host, listener.port);
    tracing::info!(kind = %T::KIND, %service_address, "starting local service");
    Ok((CoreService::new(store, service_address), consumers))
}

fn startup(e: impl std::fmt::Display) -> ServerError {
    ServerError::Startup(e.to_string())
}
