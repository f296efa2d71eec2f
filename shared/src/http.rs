use chrono::{DateTime, Utc};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "listening");
    let service_arc = Arc::new(service);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(%peer_addr, error = %e, "connection closed with error");
            }
        });
    }
}

/// Error body returned by every service in the system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEnvelope {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub status: u16,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, path: &str, message: impl Into<String>) -> Self {
        ErrorEnvelope {
            timestamp: Utc::now(),
            path: path.to_string(),
            status: status.as_u16(),
            message: message.into(),
        }
    }
}

pub fn full_body<E: 'static>(bytes: impl Into<Bytes>) -> BoxBody<Bytes, E> {
    Full::new(bytes.into()).map_err(|e| match e {}).boxed()
}

/// Serializes `value` as the JSON body of a response with the given status.
pub fn json_response<T: Serialize, E: 'static>(
    status: StatusCode,
    value: &T,
) -> Response<BoxBody<Bytes, E>> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = Response::new(full_body(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response body");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn empty_response<E: 'static>(status: StatusCode) -> Response<BoxBody<Bytes, E>> {
    let mut response = Response::new(full_body(Bytes::new()));
    *response.status_mut() = status;
    response
}

pub fn make_error_response<E: 'static>(
    status: StatusCode,
    path: &str,
    message: impl Into<String>,
) -> Response<BoxBody<Bytes, E>> {
    json_response(status, &ErrorEnvelope::new(status, path, message))
}
