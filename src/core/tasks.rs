//! Delivery tasks: the unit of outbound work.
//!
//! A task captures the rendered payload together with the criteria that
//! produced it, so delivery can run inline, on a spawned worker, or be
//! picked up later by an external scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::config::ForwardingConfig;
use crate::transport::{DispatchOptions, DispatchRouter};

use super::{PipelineContext, PipelineError, PipelineStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

/// One queued or completed delivery.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub name: String,
    pub criteria: String,
    pub payload: String,
    /// Optional downstream rule label, carried through for schedulers
    /// that chain further processing onto finished deliveries.
    pub rule: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Derive a short, collision-resistant task name from the payload and a
/// fresh nonce.
fn task_name(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("output-{}", &digest[..12])
}

/// In-process task registry, shared between the pipeline and delivery
/// workers.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<String, DeliveryTask>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new queued task and return its name.
    pub async fn create(
        &self,
        criteria: impl Into<String>,
        payload: impl Into<String>,
        rule: Option<String>,
    ) -> String {
        let payload = payload.into();
        let name = task_name(&payload);
        let task = DeliveryTask {
            name: name.clone(),
            criteria: criteria.into(),
            payload,
            rule,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        self.tasks.write().await.insert(name.clone(), task);
        name
    }

    pub async fn get(&self, name: &str) -> Option<DeliveryTask> {
        self.tasks.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<DeliveryTask> {
        let mut tasks: Vec<DeliveryTask> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub async fn set_status(&self, name: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.write().await.get_mut(name) {
            task.status = status;
        }
    }

    pub async fn mark_finished(&self, name: &str) {
        if let Some(task) = self.tasks.write().await.get_mut(name) {
            task.status = TaskStatus::Finished;
            task.completed_at = Some(Utc::now());
        }
    }

    pub async fn mark_failed(&self, name: &str, reason: impl Into<String>) {
        if let Some(task) = self.tasks.write().await.get_mut(name) {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.error = Some(reason.into());
        }
    }
}

/// Execute one queued task: resolve its criteria, dispatch the payload,
/// and record the terminal status on the store.
#[instrument(skip(store, config, router, options), fields(task = %name))]
pub async fn deliver_task(
    store: Arc<TaskStore>,
    config: Arc<ForwardingConfig>,
    router: Arc<DispatchRouter>,
    name: String,
    options: DispatchOptions,
) -> Result<(), PipelineError> {
    let task = store.get(&name).await.ok_or_else(|| {
        PipelineError::Configuration(format!("delivery task {name} could not be found"))
    })?;
    let Some(resolved) = config.resolve(&task.criteria) else {
        // The task must still reach a terminal status so schedulers do
        // not wait on it forever.
        let reason = format!("criteria {} for task {name} could not be found", task.criteria);
        store.mark_failed(&name, reason.clone()).await;
        return Err(PipelineError::Configuration(reason));
    };

    store.set_status(&name, TaskStatus::Running).await;
    let options = options.with_task_name(&name);
    let result = router
        .send(
            &resolved.endpoint.urn,
            &task.payload,
            resolved.credential.as_ref(),
            &options,
        )
        .await;

    match result {
        Ok(response) => {
            info!(status = ?response.status, "delivery finished");
            store.mark_finished(&name).await;
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "delivery failed");
            store.mark_failed(&name, err.to_string()).await;
            Err(PipelineError::Transport(err))
        }
    }
}

/// Run a delivery on its own tokio task, detached from the pipeline.
pub fn spawn_delivery(
    store: Arc<TaskStore>,
    config: Arc<ForwardingConfig>,
    router: Arc<DispatchRouter>,
    name: String,
    options: DispatchOptions,
) -> JoinHandle<Result<(), PipelineError>> {
    tokio::spawn(deliver_task(store, config, router, name, options))
}

/// Creates the delivery task for a run and, when configured, delivers it
/// inline.
///
/// The payload is normally the assembled outbound document. In
/// forward-data mode the raw inbound document is sent instead whenever
/// anything (events or header) matched. A run with no payload creates no
/// task and is not an error.
pub struct DispatchStage {
    store: Arc<TaskStore>,
    config: Arc<ForwardingConfig>,
    router: Arc<DispatchRouter>,
    options: DispatchOptions,
    forward_data: bool,
    run_immediately: bool,
    rule: Option<String>,
}

impl DispatchStage {
    pub fn new(
        store: Arc<TaskStore>,
        config: Arc<ForwardingConfig>,
        router: Arc<DispatchRouter>,
    ) -> Self {
        Self {
            store,
            config,
            router,
            options: DispatchOptions::default(),
            forward_data: false,
            run_immediately: false,
            rule: None,
        }
    }

    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Forward the raw inbound document instead of the assembled payload.
    pub fn forward_data(mut self, forward: bool) -> Self {
        self.forward_data = forward;
        self
    }

    /// Deliver inline instead of leaving the task queued.
    pub fn run_immediately(mut self, immediate: bool) -> Self {
        self.run_immediately = immediate;
        self
    }

    /// Label finished tasks with a downstream rule name.
    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    fn select_payload(&self, ctx: &PipelineContext) -> Option<String> {
        if self.forward_data {
            if !ctx.filtered_events.is_empty() || ctx.header_matched {
                return ctx.document.raw.clone();
            }
            return None;
        }
        ctx.outbound_payload.clone()
    }
}

#[async_trait]
impl PipelineStage for DispatchStage {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let resolved = ctx.require_criteria()?;
        let criteria_name = resolved.criteria.name.clone();

        let Some(payload) = self.select_payload(ctx) else {
            debug!("no payload for this run; no delivery task created");
            return Ok(());
        };

        let name = self
            .store
            .create(criteria_name, payload, self.rule.clone())
            .await;
        info!(task = %name, immediate = self.run_immediately, "delivery task created");
        ctx.created_task = Some(name.clone());

        if self.run_immediately {
            deliver_task(
                self.store.clone(),
                self.config.clone(),
                self.router.clone(),
                name,
                self.options.clone(),
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RouterConfig;

    #[tokio::test]
    async fn test_missing_criteria_fails_the_task() {
        let store = Arc::new(TaskStore::new());
        let config = Arc::new(ForwardingConfig::default());
        let router = Arc::new(DispatchRouter::new(RouterConfig::default()));
        let name = store.create("removed-criteria", "{}", None).await;

        let err = deliver_task(
            store.clone(),
            config,
            router,
            name.clone(),
            DispatchOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));

        // The task reaches a terminal status even though delivery never
        // started.
        let task = store.get(&name).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("removed-criteria"));
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_task_names_are_unique_and_prefixed() {
        let store = TaskStore::new();
        let a = store.create("c", "same payload", None).await;
        let b = store.create("c", "same payload", None).await;
        assert_ne!(a, b);
        assert!(a.starts_with("output-"));
        assert_eq!(a.len(), "output-".len() + 12);
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let store = TaskStore::new();
        let name = store.create("c", "{}", Some("next-rule".to_string())).await;

        let task = store.get(&name).await.unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.rule.as_deref(), Some("next-rule"));
        assert!(task.completed_at.is_none());

        store.set_status(&name, TaskStatus::Running).await;
        store.mark_failed(&name, "connection refused").await;
        let task = store.get(&name).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("connection refused"));
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_creation() {
        let store = TaskStore::new();
        let first = store.create("c", "one", None).await;
        let second = store.create("c", "two", None).await;
        let names: Vec<String> = store.list().await.into_iter().map(|t| t.name).collect();
        let first_pos = names.iter().position(|n| n == &first).unwrap();
        let second_pos = names.iter().position(|n| n == &second).unwrap();
        assert!(first_pos < second_pos);
    }
}
