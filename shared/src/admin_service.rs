use crate::http::{full_body, make_error_response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Liveness and readiness endpoints served on the admin listener.
///
/// `/health` answers as long as the process is up. `/ready` consults the
/// supplied closure on every call.
pub struct AdminService<F, E> {
    is_ready: F,
    _error: PhantomData<fn() -> E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self {
            is_ready,
            _error: PhantomData,
        }
    }
}

impl<F, E> Service<Request<Incoming>> for AdminService<F, E>
where
    F: Fn() -> bool,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let response = route(req.method(), req.uri().path(), || (self.is_ready)());
        Box::pin(async move { Ok(response) })
    }
}

fn route<E: 'static>(
    method: &Method,
    path: &str,
    is_ready: impl Fn() -> bool,
) -> Response<BoxBody<Bytes, E>> {
    if *method != Method::GET {
        return make_error_response(StatusCode::METHOD_NOT_ALLOWED, path, "method not allowed");
    }

    match path {
        "/health" => Response::new(full_body("ok\n")),
        "/ready" if is_ready() => Response::new(full_body("ok\n")),
        "/ready" => make_error_response(StatusCode::SERVICE_UNAVAILABLE, path, "not ready"),
        _ => make_error_response(StatusCode::NOT_FOUND, path, "not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn test_admin_routes() {
        let ok = route::<Infallible>(&Method::GET, "/health", || false);
        assert_eq!(ok.status(), StatusCode::OK);

        let ready = route::<Infallible>(&Method::GET, "/ready", || true);
        assert_eq!(ready.status(), StatusCode::OK);

        let not_ready = route::<Infallible>(&Method::GET, "/ready", || false);
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);

        let missing = route::<Infallible>(&Method::GET, "/metrics", || true);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let wrong_method = route::<Infallible>(&Method::POST, "/health", || true);
        assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
