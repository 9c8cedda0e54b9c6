use super::executor::{TaskExecutor, TaskRunOutcome};
use super::pitr::PitrRestoreTaskExecutor;
use super::restore::DatabaseRestoreTaskExecutor;
use super::ExecutionContext;
use crate::api::{Task, TaskType};
use crate::core::{RestoreError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a fresh executor, and with it a fresh completion flag.
pub type ExecutorFactory = Arc<dyn Fn() -> Arc<dyn TaskExecutor> + Send + Sync>;

/// Task type to executor mapping, built once at startup and passed by reference.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    factories: BTreeMap<TaskType, ExecutorFactory>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `task_type`, replacing any earlier one.
    pub fn register(&mut self, task_type: TaskType, factory: ExecutorFactory) {
        self.factories.insert(task_type, factory);
    }

    /// Registry with the restore and PITR executors.
    pub fn with_default_executors() -> Self {
        let mut registry = Self::new();
        registry.register(
            TaskType::DatabaseRestore,
            Arc::new(|| Arc::new(DatabaseRestoreTaskExecutor::new()) as Arc<dyn TaskExecutor>),
        );
        registry.register(
            TaskType::PitrRestore,
            Arc::new(|| Arc::new(PitrRestoreTaskExecutor::new()) as Arc<dyn TaskExecutor>),
        );
        registry
    }

    pub fn executor_for(&self, task_type: TaskType) -> Result<Arc<dyn TaskExecutor>> {
        let factory = self.factories.get(&task_type).ok_or_else(|| {
            RestoreError::Invalid(format!("no executor registered for task type {}", task_type))
        })?;
        Ok(factory())
    }

    /// Runs one attempt of `task` on a fresh executor.
    pub async fn run_once(&self, ctx: &ExecutionContext<'_>, task: &Task) -> Result<TaskRunOutcome> {
        let executor = self.executor_for(task.task_type)?;
        Ok(executor.run_once(ctx, task).await)
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        self.factories.keys().copied().collect()
    }
}
