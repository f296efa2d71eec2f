//! Wire types exchanged with clients, downstream services, and the broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ProductId = i32;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub weight: i32,
    #[serde(default)]
    pub service_address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub product_id: ProductId,
    pub recommendation_id: i32,
    pub author: String,
    pub rate: i32,
    pub content: String,
    #[serde(default)]
    pub service_address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub product_id: ProductId,
    pub review_id: i32,
    pub author: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub service_address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSummary {
    pub recommendation_id: i32,
    pub author: String,
    pub rate: i32,
    pub content: String,
}

impl From<&Recommendation> for RecommendationSummary {
    fn from(r: &Recommendation) -> Self {
        RecommendationSummary {
            recommendation_id: r.recommendation_id,
            author: r.author.clone(),
            rate: r.rate,
            content: r.content.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub review_id: i32,
    pub author: String,
    pub subject: String,
    pub content: String,
}

impl From<&Review> for ReviewSummary {
    fn from(r: &Review) -> Self {
        ReviewSummary {
            review_id: r.review_id,
            author: r.author.clone(),
            subject: r.subject.clone(),
            content: r.content.clone(),
        }
    }
}

/// Addresses of the instances that answered one composite call.
/// Unknown addresses are empty strings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAddresses {
    pub cmp: String,
    pub pro: String,
    pub rev: String,
    pub rec: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductAggregate {
    pub product_id: ProductId,
    pub name: String,
    pub weight: i32,
    #[serde(default)]
    pub recommendations: Vec<RecommendationSummary>,
    #[serde(default)]
    pub reviews: Vec<ReviewSummary>,
    #[serde(default)]
    pub service_addresses: ServiceAddresses,
}

/// The kind of record a broker channel or downstream service owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Product,
    Recommendation,
    Review,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Product,
        RecordKind::Recommendation,
        RecordKind::Review,
    ];

    /// Broker channel carrying this kind's events.
    pub const fn channel(&self) -> &'static str {
        match self {
            RecordKind::Product => "products",
            RecordKind::Recommendation => "recommendations",
            RecordKind::Review => "reviews",
        }
    }

    /// Products are keyed by product id alone; the other kinds hold many
    /// records per product, told apart by a detail id.
    pub const fn has_detail_id(&self) -> bool {
        !matches!(self, RecordKind::Product)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Product => "product",
            RecordKind::Recommendation => "recommendation",
            RecordKind::Review => "review",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record handed to the write path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Product(Product),
    Recommendation(Recommendation),
    Review(Review),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Product(_) => RecordKind::Product,
            Record::Recommendation(_) => RecordKind::Recommendation,
            Record::Review(_) => RecordKind::Review,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            Record::Product(p) => p.product_id,
            Record::Recommendation(r) => r.product_id,
            Record::Review(r) => r.product_id,
        }
    }
}

/// What a delete request removes. Without `detail_id` every record of
/// `kind` keyed by `product_id` goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteTarget {
    pub kind: RecordKind,
    pub product_id: ProductId,
    pub detail_id: Option<i32>,
}

impl DeleteTarget {
    pub fn all(kind: RecordKind, product_id: ProductId) -> Self {
        DeleteTarget {
            kind,
            product_id,
            detail_id: None,
        }
    }

    pub fn one(kind: RecordKind, product_id: ProductId, detail_id: i32) -> Self {
        DeleteTarget {
            kind,
            product_id,
            detail_id: Some(detail_id),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "&'static str")]
pub enum EventType {
    Create,
    Delete,
}

impl TryFrom<String> for EventType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "CREATE" => Ok(EventType::Create),
            "DELETE" => Ok(EventType::Delete),
            other => Err(format!(
                "Incorrect event type: {other}, expected a CREATE or DELETE event"
            )),
        }
    }
}

impl From<EventType> for &'static str {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Create => "CREATE",
            EventType::Delete => "DELETE",
        }
    }
}

/// Domain event published to the broker. `key` is the partition key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event<T> {
    pub event_type: EventType,
    pub key: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_id: Option<i32>,
    pub event_created_at: DateTime<Utc>,
}

impl<T> Event<T> {
    pub fn create(key: ProductId, data: T) -> Self {
        Event {
            event_type: EventType::Create,
            key,
            data: Some(data),
            detail_id: None,
            event_created_at: Utc::now(),
        }
    }

    pub fn delete(key: ProductId, detail_id: Option<i32>) -> Self {
        Event {
            event_type: EventType::Delete,
            key,
            data: None,
            detail_id,
            event_created_at: Utc::now(),
        }
    }
}
