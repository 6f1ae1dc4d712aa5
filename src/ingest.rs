//! Observation ingestion: results and comments.

use chrono::{DateTime, Utc};

use crate::db::{Comment, CommentKey, MetricResult, Repository, StoreError};
use crate::time::TimeDetail;

/// Append a probe result. No deduplication.
pub fn insert_result<R: Repository + ?Sized>(repo: &R, result: &MetricResult) -> Result<(), StoreError> {
    repo.insert_result(result)
}

/// Append a comment. Fails with [`StoreError::DuplicateKey`] when a comment
/// with the same (component, metric, timestamp) exists.
pub fn insert_comment<R: Repository + ?Sized>(repo: &R, comment: &Comment) -> Result<(), StoreError> {
    repo.insert_comment(comment)
}

/// Replace `old` with `new`. The delete and insert happen as one unit, so a
/// failed insert leaves `old` in place.
pub fn update_comment<R: Repository + ?Sized>(repo: &R, old: &Comment, new: &Comment) -> Result<(), StoreError> {
    repo.replace_comment(&old.key(), new)
}

pub fn delete_comment<R: Repository + ?Sized>(
    repo: &R,
    component_id: &str,
    metric_id: &str,
    timestamp: DateTime<Utc>,
) -> Result<(), StoreError> {
    repo.delete_comment(&CommentKey {
        component_id: component_id.to_string(),
        metric_id: metric_id.to_string(),
        timestamp,
    })
}

pub fn delete_comments_for_component<R: Repository + ?Sized>(repo: &R, component_id: &str) -> Result<(), StoreError> {
    repo.delete_comments_by_component(component_id)
}

/// Delete every result older than `older_than` before now.
pub fn prune_outdated_results<R: Repository + ?Sized>(repo: &R, older_than: &TimeDetail) -> Result<usize, StoreError> {
    prune_outdated_results_at(repo, older_than, Utc::now())
}

/// Delete every result with a timestamp strictly before `now - older_than`.
/// A result exactly at the cutoff is kept. A cutoff before the earliest
/// representable instant deletes nothing.
pub fn prune_outdated_results_at<R: Repository + ?Sized>(
    repo: &R,
    older_than: &TimeDetail,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let Some(cutoff) = older_than.cutoff_before(now) else {
        tracing::debug!(
            "Nothing can be older than {}, skipping prune",
            older_than.to_interval_expression()
        );
        return Ok(0);
    };
    let deleted = repo.delete_results_older_than(cutoff)?;
    tracing::debug!(
        "Pruned {} results older than {}",
        deleted,
        older_than.to_interval_expression()
    );
    Ok(deleted)
}
