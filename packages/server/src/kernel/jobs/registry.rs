//! Handler registry for task dispatch.
//!
//! Maps each [`TaskType`] to an async handler that receives the typed payload
//! and the shared [`ServerDeps`]. The processor looks handlers up by the
//! claimed task's type without knowing the concrete payload types.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use super::error::TaskError;
use super::payload::TaskPayload;
use super::task::{Task, TaskType};
use crate::common::TaskId;
use crate::kernel::ServerDeps;

/// Per-attempt facts a handler may need beyond its payload.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub retry_count: i32,
    pub worker_id: String,
}

impl TaskContext {
    pub fn for_task(task: &Task, worker_id: &str) -> Self {
        Self {
            task_id: task.id,
            retry_count: task.retry_count,
            worker_id: worker_id.to_string(),
        }
    }
}

/// A successor task a handler asks the processor to enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUp {
    pub task_type: TaskType,
    pub payload: Value,
}

impl FollowUp {
    pub fn of<P: TaskPayload>(payload: &P) -> Result<Self> {
        Ok(Self {
            task_type: P::TASK_TYPE,
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// What a successful handler produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutcome {
    /// Stored on the completed task
    pub result: Option<Value>,
    pub follow_ups: Vec<FollowUp>,
}

impl HandlerOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn then<P: TaskPayload>(mut self, payload: &P) -> Result<Self> {
        self.follow_ups.push(FollowUp::of(payload)?);
        Ok(self)
    }
}

type BoxedHandler = Box<
    dyn Fn(Value, TaskContext, Arc<ServerDeps>) -> Pin<Box<dyn Future<Output = Result<HandlerOutcome>> + Send>>
        + Send
        + Sync,
>;

/// Registry that maps task types to handlers.
///
/// # Example
///
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry.register::<Summarize, _, _>(|payload, ctx, deps| async move {
///     summarize(payload, ctx, &deps).await
/// });
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, BoxedHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `P::TASK_TYPE`, replacing any earlier one.
    pub fn register<P, F, Fut>(&mut self, handler: F)
    where
        P: TaskPayload,
        F: Fn(P, TaskContext, Arc<ServerDeps>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<HandlerOutcome>> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |value, ctx, deps| {
            let handler = handler.clone();
            Box::pin(async move {
                let payload: P = serde_json::from_value(value).map_err(|e| {
                    TaskError::validation(format!("invalid {} payload: {e}", P::TASK_TYPE))
                })?;
                handler(payload, ctx, deps).await
            })
        });

        self.handlers.insert(P::TASK_TYPE, boxed);
    }

    /// Run the handler registered for the task's type.
    pub async fn execute(&self, task: &Task, ctx: TaskContext, deps: Arc<ServerDeps>) -> Result<HandlerOutcome> {
        let handler = self
            .handlers
            .get(&task.task_type)
            .ok_or_else(|| TaskError::UnknownTaskType(task.task_type.to_string()))?;

        handler(task.payload.clone(), ctx, deps).await
    }

    pub fn is_registered(&self, task_type: TaskType) -> bool {
        self.handlers.contains_key(&task_type)
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        self.handlers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ContentId;
    use crate::kernel::jobs::payload::{GenerateThumbnail, Summarize};
    use crate::kernel::jobs::QueueName;
    use crate::kernel::TestDependencies;
    use chrono::Utc;
    use serde_json::json;

    fn task(task_type: TaskType, payload: Value) -> Task {
        let now = Utc::now();
        Task::builder()
            .task_type(task_type)
            .queue(QueueName::Content)
            .payload(payload)
            .run_after(now)
            .created_at(now)
            .updated_at(now)
            .build()
    }

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register::<Summarize, _, _>(|payload, _ctx, _deps| async move {
            HandlerOutcome::done()
                .with_result(json!({ "instruction": payload.instruction }))
                .then(&GenerateThumbnail {
                    content_id: payload.content_id,
                })
        });
        registry
    }

    #[test]
    fn test_register_and_check() {
        let registry = registry();
        assert!(registry.is_registered(TaskType::Summarize));
        assert!(!registry.is_registered(TaskType::Transcribe));
        assert_eq!(registry.registered_types(), vec![TaskType::Summarize]);
    }

    #[tokio::test]
    async fn test_execute_decodes_payload() {
        let deps = TestDependencies::new().into_server_deps();
        let content_id = ContentId::new();
        let task = task(
            TaskType::Summarize,
            json!({ "content_id": content_id, "instruction": "be brief" }),
        );

        let outcome = registry()
            .execute(&task, TaskContext::for_task(&task, "w"), deps)
            .await
            .unwrap();

        assert_eq!(outcome.result, Some(json!({ "instruction": "be brief" })));
        assert_eq!(outcome.follow_ups.len(), 1);
        assert_eq!(outcome.follow_ups[0].task_type, TaskType::GenerateThumbnail);
        assert_eq!(outcome.follow_ups[0].payload, json!({ "content_id": content_id }));
    }

    #[tokio::test]
    async fn test_unregistered_type_is_terminal() {
        let deps = TestDependencies::new().into_server_deps();
        let task = task(TaskType::Transcribe, json!({ "content_id": ContentId::new() }));

        let err = registry()
            .execute(&task, TaskContext::for_task(&task, "w"), deps)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::UnknownTaskType(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_payload_is_validation_error() {
        let deps = TestDependencies::new().into_server_deps();
        let task = task(TaskType::Summarize, json!({ "content_id": 7 }));

        let err = registry()
            .execute(&task, TaskContext::for_task(&task, "w"), deps)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Validation(_))));
    }
}
