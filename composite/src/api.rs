//! Client-facing HTTP API of the composite.

use crate::aggregator::Aggregator;
use crate::errors::{CompositeError, ServerError};
use crate::health::{HealthAggregator, Status};
use crate::metrics_defs::REQUEST_DURATION;
use crate::types::{ProductAggregate, ProductId};
use crate::writer::WriteCoordinator;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::histogram;
use shared::http::{empty_response, json_response, make_error_response};
use shared::routing::{Route, RouteTable};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

type ApiResponse = Response<BoxBody<Bytes, ServerError>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    GetAggregate,
    CreateAggregate,
    DeleteAggregate,
    Health,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::GetAggregate => "get_aggregate",
            Action::CreateAggregate => "create_aggregate",
            Action::DeleteAggregate => "delete_aggregate",
            Action::Health => "health",
        }
    }
}

struct Inner {
    routes: RouteTable<Action>,
    aggregator: Aggregator,
    writer: WriteCoordinator,
    health: HealthAggregator,
}

#[derive(Clone)]
pub struct CompositeService {
    inner: Arc<Inner>,
}

impl CompositeService {
    pub fn new(aggregator: Aggregator, writer: WriteCoordinator, health: HealthAggregator) -> Self {
        let routes = RouteTable::new(vec![
            Route::new(Method::GET, "/aggregate/{id}", Action::GetAggregate),
            Route::new(Method::POST, "/aggregate", Action::CreateAggregate),
            Route::new(Method::DELETE, "/aggregate/{id}", Action::DeleteAggregate),
            Route::new(Method::GET, "/health", Action::Health),
        ]);

        CompositeService {
            inner: Arc::new(Inner {
                routes,
                aggregator,
                writer,
                health,
            }),
        }
    }

    pub async fn handle<B>(&self, request: Request<B>) -> ApiResponse
    where
        B: Body,
        B::Error: Display,
    {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let (route, response) = self.dispatch(request, &path).await;

        let status = response.status();
        histogram!(REQUEST_DURATION, "route" => route, "status" => status.as_str().to_string())
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(%method, %path, status = status.as_u16(), "handled request");

        response
    }

    async fn dispatch<B>(&self, request: Request<B>, path: &str) -> (&'static str, ApiResponse)
    where
        B: Body,
        B::Error: Display,
    {
        let (action, id) = match self.inner.routes.resolve(&request) {
            Some(matched) => (*matched.action, matched.param("id").map(str::to_string)),
            None => {
                return (
                    "unknown",
                    make_error_response(StatusCode::NOT_FOUND, path, "Not Found"),
                );
            }
        };

        let response = match action {
            Action::GetAggregate => match parse_id(path, id.as_deref()) {
                Ok(product_id) => self.get_aggregate(path, product_id).await,
                Err(response) => response,
            },
            Action::CreateAggregate => self.create_aggregate(path, request.into_body()).await,
            Action::DeleteAggregate => match parse_id(path, id.as_deref()) {
                Ok(product_id) => self.delete_aggregate(path, product_id).await,
                Err(response) => response,
            },
            Action::Health => self.health().await,
        };

        (action.name(), response)
    }

    async fn get_aggregate(&self, path: &str, product_id: ProductId) -> ApiResponse {
        match self.inner.aggregator.get_aggregate(product_id).await {
            Ok(aggregate) => json_response(StatusCode::OK, &aggregate),
            Err(e) => error_response(path, &e),
        }
    }

    async fn create_aggregate<B>(&self, path: &str, body: B) -> ApiResponse
    where
        B: Body,
        B::Error: Display,
    {
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return make_error_response(
                    StatusCode::BAD_REQUEST,
                    path,
                    format!("Failed to read request body: {e}"),
                );
            }
        };

        let aggregate: ProductAggregate = match serde_json::from_slice(&bytes) {
            Ok(aggregate) => aggregate,
            Err(e) => {
                return make_error_response(
                    StatusCode::BAD_REQUEST,
                    path,
                    format!("Malformed request body: {e}"),
                );
            }
        };

        match self.inner.writer.create_aggregate(aggregate).await {
            Ok(()) => empty_response(StatusCode::ACCEPTED),
            Err(e) => error_response(path, &e),
        }
    }

    async fn delete_aggregate(&self, path: &str, product_id: ProductId) -> ApiResponse {
        match self.inner.writer.delete_aggregate(product_id).await {
            Ok(()) => empty_response(StatusCode::ACCEPTED),
            Err(e) => error_response(path, &e),
        }
    }

    async fn health(&self) -> ApiResponse {
        let report = self.inner.health.get_health().await;
        let status = match report.status {
            Status::Up => StatusCode::OK,
            Status::Down => StatusCode::SERVICE_UNAVAILABLE,
        };
        json_response(status, &report)
    }
}

impl Service<Request<Incoming>> for CompositeService {
    type Response = ApiResponse;
    type Error = ServerError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

fn parse_id(path: &str, id: Option<&str>) -> Result<ProductId, ApiResponse> {
    id.and_then(|id| id.parse().ok()).ok_or_else(|| {
        make_error_response(
            StatusCode::BAD_REQUEST,
            path,
            format!("Type mismatch: productId must be an integer, got {:?}", id.unwrap_or("")),
        )
    })
}

fn error_response(path: &str, error: &CompositeError) -> ApiResponse {
    make_error_response(error.status_code(), path, error.message())
}
