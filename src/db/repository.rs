//! Persistent store port consumed by reconciliation and ingestion.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::*;

/// Store failure kinds surfaced to callers.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transient connection-level failure; the whole call may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Referential or uniqueness conflict.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    /// A comment with the same (component, metric, timestamp) already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    /// A stored row could not be decoded into the entity model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("SQLite error: {0}")]
    Backend(rusqlite::Error),
}

/// Row-level operations on systems, components, metrics, results and comments.
///
/// Lookups return `None` or an empty list for missing rows. Deletes are
/// idempotent. Inserts fail with [`StoreError::ConstraintViolation`] on a
/// duplicate primary key or dangling parent, except comments which report
/// [`StoreError::DuplicateKey`].
pub trait Repository {
    fn get_system(&self, id: &str) -> Result<Option<System>, StoreError>;
    fn list_systems(&self) -> Result<Vec<System>, StoreError>;
    fn insert_system(&self, system: &System) -> Result<(), StoreError>;
    fn delete_system(&self, id: &str) -> Result<(), StoreError>;

    fn get_component(&self, id: &str) -> Result<Option<Component>, StoreError>;
    fn list_components(&self) -> Result<Vec<Component>, StoreError>;
    fn list_components_by_system(&self, system_id: &str) -> Result<Vec<Component>, StoreError>;
    fn insert_component(&self, component: &Component) -> Result<(), StoreError>;
    fn delete_component(&self, id: &str) -> Result<(), StoreError>;

    fn get_metric(&self, component_id: &str, metric_id: &str) -> Result<Option<Metric>, StoreError>;
    fn list_metrics_by_component(&self, component_id: &str) -> Result<Vec<Metric>, StoreError>;
    fn insert_metric(&self, component_id: &str, metric: &Metric) -> Result<(), StoreError>;
    fn delete_metrics_by_component(&self, component_id: &str) -> Result<(), StoreError>;

    fn insert_result(&self, result: &MetricResult) -> Result<(), StoreError>;
    fn list_results_by_component(&self, component_id: &str) -> Result<Vec<MetricResult>, StoreError>;
    fn delete_results_by_component(&self, component_id: &str) -> Result<(), StoreError>;
    /// Delete every result with `timestamp < cutoff`. Returns the number of rows removed.
    fn delete_results_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
    /// Same as [`Repository::delete_results_older_than`], limited to one metric.
    fn delete_metric_results_older_than(
        &self,
        component_id: &str,
        metric_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    fn get_comment(&self, key: &CommentKey) -> Result<Option<Comment>, StoreError>;
    fn list_comments_by_component(&self, component_id: &str) -> Result<Vec<Comment>, StoreError>;
    fn insert_comment(&self, comment: &Comment) -> Result<(), StoreError>;
    /// Delete `old` and insert `new` as one unit; neither takes effect if either fails.
    fn replace_comment(&self, old: &CommentKey, new: &Comment) -> Result<(), StoreError>;
    fn delete_comment(&self, key: &CommentKey) -> Result<(), StoreError>;
    fn delete_comments_by_component(&self, component_id: &str) -> Result<(), StoreError>;
}
