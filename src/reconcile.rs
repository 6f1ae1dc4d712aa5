//! Configuration reconciliation.
//!
//! [`reconcile`] makes the stored system/component/metric hierarchy match a
//! declared [`Config`]:
//!
//! 1. Every declared system whose id already exists has its whole subtree
//!    removed (comments, results and metrics of each component, then the
//!    components, then the system) before the system row is inserted again.
//! 2. Every declared component whose id already exists has its metrics and
//!    its row removed; then the component and its metrics are inserted.
//!
//! Components are only ever created in the second pass. Each store call
//! commits on its own unless the repository is a transaction (see
//! [`reconcile_atomic`]); the first failure is returned and the remaining
//! steps are skipped.

use serde::{Deserialize, Serialize};

use crate::db::{Config, Repository, Store, StoreError};

/// Row counts of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub systems_replaced: usize,
    pub systems_inserted: usize,
    /// Components removed as part of a system subtree.
    pub components_cascaded: usize,
    /// Components removed because their id was declared again.
    pub components_replaced: usize,
    pub components_inserted: usize,
    pub metrics_inserted: usize,
}

/// Apply `cfg` against `repo`.
pub fn reconcile<R: Repository + ?Sized>(repo: &R, cfg: &Config) -> Result<ReconcileSummary, StoreError> {
    let mut summary = ReconcileSummary::default();

    for system in &cfg.systems {
        if repo.get_system(&system.id)?.is_some() {
            tracing::debug!("System {} present, deleting subtree", system.id);
            summary.components_cascaded += delete_system_subtree(repo, &system.id)?;
            summary.systems_replaced += 1;
        }
        repo.insert_system(system)?;
        summary.systems_inserted += 1;
    }

    for component in &cfg.components {
        if repo.get_component(&component.id)?.is_some() {
            tracing::debug!("Component {} present, replacing", component.id);
            repo.delete_metrics_by_component(&component.id)?;
            repo.delete_component(&component.id)?;
            summary.components_replaced += 1;
        }
        repo.insert_component(component)?;
        summary.components_inserted += 1;

        for metric in &component.metrics {
            repo.insert_metric(&component.id, metric)?;
            summary.metrics_inserted += 1;
        }
    }

    tracing::info!(
        "Applied config {:?}: {} systems ({} replaced), {} components ({} replaced, {} cascaded), {} metrics",
        cfg.version,
        summary.systems_inserted,
        summary.systems_replaced,
        summary.components_inserted,
        summary.components_replaced,
        summary.components_cascaded,
        summary.metrics_inserted,
    );

    Ok(summary)
}

/// Apply `cfg` inside one transaction: either all of it lands or none of it.
/// Holds the store lock for the whole run, so no ingestion call can
/// interleave.
pub fn reconcile_atomic(store: &Store, cfg: &Config) -> Result<ReconcileSummary, StoreError> {
    store.transaction(|conn| reconcile(conn, cfg))
}

/// Delete every component of `system_id` with its observations and metrics,
/// then the system row. Returns the number of components removed.
fn delete_system_subtree<R: Repository + ?Sized>(repo: &R, system_id: &str) -> Result<usize, StoreError> {
    let components = repo.list_components_by_system(system_id)?;
    for component in &components {
        delete_component_cascade(repo, &component.id)?;
    }
    repo.delete_system(system_id)?;
    Ok(components.len())
}

fn delete_component_cascade<R: Repository + ?Sized>(repo: &R, component_id: &str) -> Result<(), StoreError> {
    repo.delete_comments_by_component(component_id)?;
    repo.delete_results_by_component(component_id)?;
    repo.delete_metrics_by_component(component_id)?;
    repo.delete_component(component_id)
}
