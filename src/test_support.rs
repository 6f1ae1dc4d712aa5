//! Fixtures and a fault-injecting repository shared by the unit tests.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::cell::{Cell, RefCell};

use crate::db::*;
use crate::time::{TimeDetail, TimeUnit};

pub fn system(id: &str) -> System {
    System {
        id: id.to_string(),
        name: format!("System {id}"),
        reference: format!("ref-{id}"),
    }
}

pub fn metric(id: &str) -> Metric {
    Metric {
        id: id.to_string(),
        endpoint: format!("/{id}/status"),
        frequency: TimeDetail::new(30, TimeUnit::Seconds),
        expected_time: TimeDetail::new(200, TimeUnit::Milliseconds),
        timeout: TimeDetail::new(5, TimeUnit::Seconds),
        delete_after: TimeDetail::new(7, TimeUnit::Days),
        auth_token: Some("token".to_string()),
        base_url: None,
    }
}

pub fn component(id: &str, system_id: &str, metric_ids: &[&str]) -> Component {
    Component {
        id: id.to_string(),
        name: format!("Component {id}"),
        base_url: "http://localhost:9000".to_string(),
        system_id: system_id.to_string(),
        reference: format!("ref-{id}"),
        auth_token: None,
        metrics: metric_ids.iter().map(|m| metric(m)).collect(),
    }
}

pub fn result_for(component_id: &str, metric_id: &str, timestamp: DateTime<Utc>) -> MetricResult {
    MetricResult {
        metric_id: metric_id.to_string(),
        component_id: component_id.to_string(),
        value: Some("200".to_string()),
        timeout: false,
        timestamp,
        response_time: 42.0,
    }
}

pub fn comment_for(component_id: &str, metric_id: &str, text: &str, timestamp: DateTime<Utc>) -> Comment {
    Comment {
        metric_id: metric_id.to_string(),
        component_id: component_id.to_string(),
        comment: text.to_string(),
        timestamp,
        start_timestamp: timestamp - ChronoDuration::hours(1),
        end_timestamp: timestamp,
    }
}

/// Ids of every system, component and (component, metric) pair in the store.
pub fn snapshot<R: Repository + ?Sized>(repo: &R) -> (Vec<String>, Vec<String>, Vec<(String, String)>) {
    let systems = repo.list_systems().unwrap().into_iter().map(|s| s.id).collect();
    let components = repo.list_components().unwrap();
    let mut metrics = Vec::new();
    for c in &components {
        for m in repo.list_metrics_by_component(&c.id).unwrap() {
            metrics.push((c.id.clone(), m.id));
        }
    }
    (systems, components.into_iter().map(|c| c.id).collect(), metrics)
}

/// Wraps a store, recording every mutating call and failing the Nth one.
pub struct FlakyRepository<'a> {
    inner: &'a Store,
    fail_at: Option<usize>,
    failure: fn(String) -> StoreError,
    calls: Cell<usize>,
    pub log: RefCell<Vec<String>>,
}

impl<'a> FlakyRepository<'a> {
    pub fn new(inner: &'a Store) -> Self {
        Self {
            inner,
            fail_at: None,
            failure: StoreError::Unavailable,
            calls: Cell::new(0),
            log: RefCell::new(Vec::new()),
        }
    }

    pub fn failing_at(inner: &'a Store, n: usize, failure: fn(String) -> StoreError) -> Self {
        Self {
            fail_at: Some(n),
            failure,
            ..Self::new(inner)
        }
    }

    pub fn ops(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn mutate(&self, op: String) -> Result<(), StoreError> {
        let n = self.calls.get() + 1;
        self.calls.set(n);
        if self.fail_at == Some(n) {
            return Err((self.failure)(format!("injected failure at {op}")));
        }
        self.log.borrow_mut().push(op);
        Ok(())
    }
}

impl Repository for FlakyRepository<'_> {
    fn get_system(&self, id: &str) -> Result<Option<System>, StoreError> {
        self.inner.get_system(id)
    }

    fn list_systems(&self) -> Result<Vec<System>, StoreError> {
        self.inner.list_systems()
    }

    fn insert_system(&self, system: &System) -> Result<(), StoreError> {
        self.mutate(format!("insert_system {}", system.id))?;
        self.inner.insert_system(system)
    }

    fn delete_system(&self, id: &str) -> Result<(), StoreError> {
        self.mutate(format!("delete_system {id}"))?;
        self.inner.delete_system(id)
    }

    fn get_component(&self, id: &str) -> Result<Option<Component>, StoreError> {
        self.inner.get_component(id)
    }

    fn list_components(&self) -> Result<Vec<Component>, StoreError> {
        self.inner.list_components()
    }

    fn list_components_by_system(&self, system_id: &str) -> Result<Vec<Component>, StoreError> {
        self.inner.list_components_by_system(system_id)
    }

    fn insert_component(&self, component: &Component) -> Result<(), StoreError> {
        self.mutate(format!("insert_component {}", component.id))?;
        self.inner.insert_component(component)
    }

    fn delete_component(&self, id: &str) -> Result<(), StoreError> {
        self.mutate(format!("delete_component {id}"))?;
        self.inner.delete_component(id)
    }

    fn get_metric(&self, component_id: &str, metric_id: &str) -> Result<Option<Metric>, StoreError> {
        self.inner.get_metric(component_id, metric_id)
    }

    fn list_metrics_by_component(&self, component_id: &str) -> Result<Vec<Metric>, StoreError> {
        self.inner.list_metrics_by_component(component_id)
    }

    fn insert_metric(&self, component_id: &str, metric: &Metric) -> Result<(), StoreError> {
        self.mutate(format!("insert_metric {component_id}/{}", metric.id))?;
        self.inner.insert_metric(component_id, metric)
    }

    fn delete_metrics_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.mutate(format!("delete_metrics {component_id}"))?;
        self.inner.delete_metrics_by_component(component_id)
    }

    fn insert_result(&self, result: &MetricResult) -> Result<(), StoreError> {
        self.mutate(format!("insert_result {}/{}", result.component_id, result.metric_id))?;
        self.inner.insert_result(result)
    }

    fn list_results_by_component(&self, component_id: &str) -> Result<Vec<MetricResult>, StoreError> {
        self.inner.list_results_by_component(component_id)
    }

    fn delete_results_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.mutate(format!("delete_results {component_id}"))?;
        self.inner.delete_results_by_component(component_id)
    }

    fn delete_results_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.mutate("delete_results_older_than".to_string())?;
        self.inner.delete_results_older_than(cutoff)
    }

    fn delete_metric_results_older_than(
        &self,
        component_id: &str,
        metric_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.mutate(format!("delete_metric_results_older_than {component_id}/{metric_id}"))?;
        self.inner.delete_metric_results_older_than(component_id, metric_id, cutoff)
    }

    fn get_comment(&self, key: &CommentKey) -> Result<Option<Comment>, StoreError> {
        self.inner.get_comment(key)
    }

    fn list_comments_by_component(&self, component_id: &str) -> Result<Vec<Comment>, StoreError> {
        self.inner.list_comments_by_component(component_id)
    }

    fn insert_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        self.mutate(format!("insert_comment {}/{}", comment.component_id, comment.metric_id))?;
        self.inner.insert_comment(comment)
    }

    fn replace_comment(&self, old: &CommentKey, new: &Comment) -> Result<(), StoreError> {
        self.mutate(format!("replace_comment {}/{}", old.component_id, old.metric_id))?;
        self.inner.replace_comment(old, new)
    }

    fn delete_comment(&self, key: &CommentKey) -> Result<(), StoreError> {
        self.mutate(format!("delete_comment {}/{}", key.component_id, key.metric_id))?;
        self.inner.delete_comment(key)
    }

    fn delete_comments_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.mutate(format!("delete_comments {component_id}"))?;
        self.inner.delete_comments_by_component(component_id)
    }
}
