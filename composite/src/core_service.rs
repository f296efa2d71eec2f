//! Read side of a downstream service backed by an in-memory store.
//!
//! Serves `GET /product/{id}` for products and `GET /{kind}?productId={id}`
//! for recommendations and reviews, plus `GET /actuator/health`. Used when
//! the whole system runs in one process.

use crate::errors::{CompositeError, ServerError};
use crate::store::{Store, StoredRecord};
use crate::types::{ProductId, RecordKind};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use shared::http::{json_response, make_error_response};
use shared::routing::{Route, RouteTable};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type CoreResponse = Response<BoxBody<Bytes, ServerError>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CoreAction {
    Find,
    Health,
}

struct Inner<T> {
    routes: RouteTable<CoreAction>,
    store: Arc<dyn Store<T>>,
    service_address: String,
}

pub struct CoreService<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CoreService<T> {
    fn clone(&self) -> Self {
        CoreService {
            inner: self.inner.clone(),
        }
    }
}

impl<T: StoredRecord + Serialize> CoreService<T> {
    pub fn new(store: Arc<dyn Store<T>>, service_address: String) -> Self {
        let find_path = match T::KIND {
            RecordKind::Product => "/product/{id}".to_string(),
            kind => format!("/{kind}"),
        };
        let routes = RouteTable::new(vec![
            Route::new(Method::GET, &find_path, CoreAction::Find),
            Route::new(Method::GET, "/actuator/health", CoreAction::Health),
        ]);

        CoreService {
            inner: Arc::new(Inner {
                routes,
                store,
                service_address,
            }),
        }
    }

    pub fn handle<B>(&self, request: &Request<B>) -> CoreResponse {
        let path = request.uri().path();
        let (action, id) = match self.inner.routes.resolve(request) {
            Some(matched) => (*matched.action, matched.param("id").map(str::to_string)),
            None => return make_error_response(StatusCode::NOT_FOUND, path, "Not Found"),
        };

        match action {
            CoreAction::Health => json_response(StatusCode::OK, &serde_json::json!({"status": "UP"})),
            CoreAction::Find => {
                let id = id.or_else(|| query_product_id(request.uri().query()));
                match id.as_deref().map(str::parse::<ProductId>) {
                    Some(Ok(product_id)) => self.find(path, product_id),
                    _ => make_error_response(
                        StatusCode::BAD_REQUEST,
                        path,
                        "Type mismatch: productId must be an integer",
                    ),
                }
            }
        }
    }

    fn find(&self, path: &str, product_id: ProductId) -> CoreResponse {
        let mut records = match self.inner.store.find(product_id) {
            Ok(records) => records,
            Err(e) => return make_error_response(e.status_code(), path, e.message()),
        };
        for record in &mut records {
            record.set_service_address(&self.inner.service_address);
        }

        tracing::debug!(kind = %T::KIND, product_id, count = records.len(), "served records");

        if T::KIND != RecordKind::Product {
            return json_response(StatusCode::OK, &records);
        }
        match records.into_iter().next() {
            Some(record) => json_response(StatusCode::OK, &record),
            None => {
                let e = CompositeError::NotFound(format!(
                    "No product found for productId: {product_id}"
                ));
                make_error_response(e.status_code(), path, e.message())
            }
        }
    }
}

fn query_product_id(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == "productId")
        .map(|(_, value)| value.into_owned())
}

impl<T: StoredRecord + Serialize> Service<Request<Incoming>> for CoreService<T> {
    type Response = CoreResponse;
    type Error = ServerError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let response = self.handle(&req);
        Box::pin(async move { Ok(response) })
    }
}
