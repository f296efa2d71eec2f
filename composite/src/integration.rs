//! Outbound capabilities of the composite: downstream reads, event
//! publication and health probes.

use crate::broker::{Message, MessageBroker};
use crate::config::{Timeouts, Upstreams};
use crate::errors::{CompositeError, Result};
use crate::http::{get_json, probe};
use crate::types::{Product, ProductId, Recommendation, RecordKind, Review};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait Integration: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> Result<Product>;

    async fn get_recommendations(&self, product_id: ProductId) -> Result<Vec<Recommendation>>;

    async fn get_reviews(&self, product_id: ProductId) -> Result<Vec<Review>>;

    /// Hands `message` to the broker channel of `kind`. May block; call it
    /// through the scheduler.
    fn publish(&self, kind: RecordKind, message: Message) -> Result<()>;

    /// Checks that the downstream service owning `kind` is up.
    async fn probe(&self, kind: RecordKind) -> Result<()>;
}

pub struct HttpIntegration {
    client: reqwest::Client,
    upstreams: Upstreams,
    timeouts: Timeouts,
    broker: Arc<dyn MessageBroker>,
}

impl HttpIntegration {
    pub fn new(upstreams: Upstreams, timeouts: Timeouts, broker: Arc<dyn MessageBroker>) -> Self {
        HttpIntegration {
            client: reqwest::Client::new(),
            upstreams,
            timeouts,
            broker,
        }
    }

    fn base_url(&self, kind: RecordKind) -> &Url {
        match kind {
            RecordKind::Product => &self.upstreams.product,
            RecordKind::Recommendation => &self.upstreams.recommendation,
            RecordKind::Review => &self.upstreams.review,
        }
    }

    /// Appends `segments` to the path of the base URL of `kind`, keeping
    /// any base path the upstream is mounted under.
    fn endpoint(&self, kind: RecordKind, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url(kind).clone();
        url.path_segments_mut()
            .map_err(|()| {
                CompositeError::unexpected(format!("Upstream URL for {kind} cannot be a base"))
            })?
            .pop_if_empty()
            .extend(segments);
        url.set_query(None);
        Ok(url)
    }

    /// `{base}/{kind}?productId={id}`
    fn details_url(&self, kind: RecordKind, product_id: ProductId) -> Result<Url> {
        let mut url = self.endpoint(kind, &[kind.as_str()])?;
        url.query_pairs_mut()
            .append_pair("productId", &product_id.to_string());
        Ok(url)
    }
}

#[async_trait]
impl Integration for HttpIntegration {
    async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        let url = self.endpoint(RecordKind::Product, &["product", &product_id.to_string()])?;
        let product: Product = get_json(&self.client, url, self.timeouts.http_timeout()).await?;
        tracing::debug!(product_id = product.product_id, "found a product");
        Ok(product)
    }

    async fn get_recommendations(&self, product_id: ProductId) -> Result<Vec<Recommendation>> {
        let url = self.details_url(RecordKind::Recommendation, product_id)?;
        let recommendations: Vec<Recommendation> =
            get_json(&self.client, url, self.timeouts.http_timeout()).await?;
        tracing::debug!(
            product_id,
            count = recommendations.len(),
            "found recommendations"
        );
        Ok(recommendations)
    }

    async fn get_reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        let url = self.details_url(RecordKind::Review, product_id)?;
        let reviews: Vec<Review> = get_json(&self.client, url, self.timeouts.http_timeout()).await?;
        tracing::debug!(product_id, count = reviews.len(), "found reviews");
        Ok(reviews)
    }

    fn publish(&self, kind: RecordKind, message: Message) -> Result<()> {
        self.broker
            .publish(kind.channel(), message)
            .map_err(|e| CompositeError::unexpected(e.to_string()))
    }

    async fn probe(&self, kind: RecordKind) -> Result<()> {
        let url = self.endpoint(kind, &["actuator", "health"])?;
        probe(&self.client, url, self.timeouts.health_timeout()).await
    }
}
