//! Entity model: systems own components, components own metrics, and
//! results/comments are observations recorded against a metric.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::TimeDetail;

/// A monitored system. `id` is the stable external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

/// A component of a system, exposing one or more polled metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub system_id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Declared metrics. Empty on rows read back through the component
    /// lookups; use `list_metrics_by_component` for the stored set.
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

/// A polled endpoint of a component. Unique by `id` within its component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: String,
    pub endpoint: String,
    pub frequency: TimeDetail,
    pub expected_time: TimeDetail,
    pub timeout: TimeDetail,
    pub delete_after: TimeDetail,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// One probe observation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricResult {
    pub metric_id: String,
    pub component_id: String,
    #[serde(default)]
    pub value: Option<String>,
    pub timeout: bool,
    pub timestamp: DateTime<Utc>,
    pub response_time: f64,
}

/// Identity of a comment row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentKey {
    pub component_id: String,
    pub metric_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Operator annotation over a time range of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub metric_id: String,
    pub component_id: String,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
}

impl Comment {
    pub fn key(&self) -> CommentKey {
        CommentKey {
            component_id: self.component_id.clone(),
            metric_id: self.metric_id.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Declarative configuration document. Input to reconciliation, never
/// persisted itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub systems: Vec<System>,
    #[serde(default)]
    pub components: Vec<Component>,
}
