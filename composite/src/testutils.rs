use crate::broker::{InMemoryBroker, Message, MessageBroker};
use crate::config::BrokerConfig;
use crate::errors::{CompositeError, Result};
use crate::integration::Integration;
use crate::store::{InMemoryStore, Store};
use crate::types::{Product, ProductId, Recommendation, RecordKind, Review};
use async_trait::async_trait;
use http::StatusCode;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioExecutor;
use parking_lot::Mutex;
use shared::http::ErrorEnvelope;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

pub fn product(product_id: ProductId) -> Product {
    Product {
        product_id,
        name: "n".into(),
        weight: 10,
        service_address: String::new(),
    }
}

pub fn recommendation(product_id: ProductId, recommendation_id: i32) -> Recommendation {
    Recommendation {
        product_id,
        recommendation_id,
        author: format!("author {recommendation_id}"),
        rate: recommendation_id,
        content: "content".into(),
        service_address: String::new(),
    }
}

pub fn review(product_id: ProductId, review_id: i32) -> Review {
    Review {
        product_id,
        review_id,
        author: format!("author {review_id}"),
        subject: "subject".into(),
        content: "content".into(),
        service_address: String::new(),
    }
}

/// Canned answer of a throwaway HTTP server.
pub struct Reply {
    status: StatusCode,
    body: String,
    delay: Option<Duration>,
}

impl Reply {
    pub fn json(status: StatusCode, body: &str) -> Self {
        Reply {
            status,
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn error(status: StatusCode, path: &str, message: &str) -> Self {
        let envelope = ErrorEnvelope::new(status, path, message);
        Reply::json(status, &serde_json::to_string(&envelope).unwrap())
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Starts an HTTP server on a random port answering every request with
/// `reply_fn(path)`.
pub async fn start_test_server<F>(reply_fn: F) -> u16
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let reply_fn = Arc::new(reply_fn);

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = hyper_util::rt::TokioIo::new(stream);
            let reply_fn = reply_fn.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let reply = reply_fn(req.uri().path());
                    async move {
                        if let Some(delay) = reply.delay {
                            tokio::time::sleep(delay).await;
                        }
                        let mut response = Response::new(Full::new(Bytes::from(reply.body)));
                        *response.status_mut() = reply.status;
                        response
                            .headers_mut()
                            .insert(CONTENT_TYPE, "application/json".parse().unwrap());
                        Ok::<_, Infallible>(response)
                    }
                });

                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    port
}

/// Integration test double with canned results and call counters.
pub struct MockIntegration {
    product: Result<Product>,
    recommendations: Result<Vec<Recommendation>>,
    reviews: Result<Vec<Review>>,
    delays: HashMap<RecordKind, Duration>,
    probes: HashMap<RecordKind, Result<()>>,
    publish_error: Option<CompositeError>,
    calls: HashMap<RecordKind, AtomicUsize>,
    completed: HashMap<RecordKind, AtomicUsize>,
    pub published: Mutex<Vec<(RecordKind, Message)>>,
}

impl MockIntegration {
    pub fn new(product: Result<Product>) -> Self {
        MockIntegration {
            product,
            recommendations: Ok(Vec::new()),
            reviews: Ok(Vec::new()),
            delays: HashMap::new(),
            probes: HashMap::new(),
            publish_error: None,
            calls: RecordKind::ALL
                .iter()
                .map(|kind| (*kind, AtomicUsize::new(0)))
                .collect(),
            completed: RecordKind::ALL
                .iter()
                .map(|kind| (*kind, AtomicUsize::new(0)))
                .collect(),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn with_recommendations(mut self, recommendations: Result<Vec<Recommendation>>) -> Self {
        self.recommendations = recommendations;
        self
    }

    pub fn with_reviews(mut self, reviews: Result<Vec<Review>>) -> Self {
        self.reviews = reviews;
        self
    }

    pub fn with_delay(mut self, kind: RecordKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    pub fn with_probe(mut self, kind: RecordKind, result: Result<()>) -> Self {
        self.probes.insert(kind, result);
        self
    }

    pub fn with_publish_error(mut self, error: CompositeError) -> Self {
        self.publish_error = Some(error);
        self
    }

    /// Number of reads started against `kind`.
    pub fn calls(&self, kind: RecordKind) -> usize {
        self.calls[&kind].load(Ordering::SeqCst)
    }

    /// Number of reads against `kind` that ran to completion.
    pub fn completed(&self, kind: RecordKind) -> usize {
        self.completed[&kind].load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        RecordKind::ALL.iter().map(|kind| self.calls(*kind)).sum()
    }

    async fn read<T: Clone>(&self, kind: RecordKind, result: &Result<T>) -> Result<T> {
        self.calls[&kind].fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&kind) {
            tokio::time::sleep(*delay).await;
        }
        self.completed[&kind].fetch_add(1, Ordering::SeqCst);
        result.clone()
    }
}

#[async_trait]
impl Integration for MockIntegration {
    async fn get_product(&self, _product_id: ProductId) -> Result<Product> {
        self.read(RecordKind::Product, &self.product).await
    }

    async fn get_recommendations(&self, _product_id: ProductId) -> Result<Vec<Recommendation>> {
        self.read(RecordKind::Recommendation, &self.recommendations)
            .await
    }

    async fn get_reviews(&self, _product_id: ProductId) -> Result<Vec<Review>> {
        self.read(RecordKind::Review, &self.reviews).await
    }

    fn publish(&self, kind: RecordKind, message: Message) -> Result<()> {
        if let Some(error) = &self.publish_error {
            return Err(error.clone());
        }
        self.published.lock().push((kind, message));
        Ok(())
    }

    async fn probe(&self, kind: RecordKind) -> Result<()> {
        if let Some(delay) = self.delays.get(&kind) {
            tokio::time::sleep(*delay).await;
        }
        self.probes.get(&kind).cloned().unwrap_or(Ok(()))
    }
}

/// Integration reading straight from in-memory stores and publishing to an
/// in-process broker, i.e. the whole system without HTTP in between.
pub struct LocalIntegration {
    pub broker: Arc<InMemoryBroker>,
    pub products: Arc<InMemoryStore<Product>>,
    pub recommendations: Arc<InMemoryStore<Recommendation>>,
    pub reviews: Arc<InMemoryStore<Review>>,
}

impl LocalIntegration {
    pub fn new() -> Self {
        LocalIntegration {
            broker: Arc::new(InMemoryBroker::new(
                &BrokerConfig {
                    partitions: 2,
                    partition_capacity: 16,
                },
                RecordKind::ALL.iter().map(|kind| kind.channel()),
            )),
            products: Arc::new(InMemoryStore::new()),
            recommendations: Arc::new(InMemoryStore::new()),
            reviews: Arc::new(InMemoryStore::new()),
        }
    }
}

#[async_trait]
impl Integration for LocalIntegration {
    async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.products
            .find(product_id)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CompositeError::NotFound(format!("No product found for productId: {product_id}"))
            })
    }

    async fn get_recommendations(&self, product_id: ProductId) -> Result<Vec<Recommendation>> {
        self.recommendations.find(product_id)
    }

    async fn get_reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        self.reviews.find(product_id)
    }

    fn publish(&self, kind: RecordKind, message: Message) -> Result<()> {
        self.broker
            .publish(kind.channel(), message)
            .map_err(|e| CompositeError::unexpected(e.to_string()))
    }

    async fn probe(&self, _kind: RecordKind) -> Result<()> {
        Ok(())
    }
}
