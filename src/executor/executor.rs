use super::ExecutionContext;
use crate::api::{Progress, Task, TaskRunResultPayload};
use crate::core::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of one `run_once` attempt.
#[derive(Debug)]
pub struct TaskRunOutcome {
    /// Whether the task reached a terminal state. Single-shot executors
    /// always terminate, on success and on failure alike.
    pub terminated: bool,
    pub result: Result<TaskRunResultPayload>,
}

impl TaskRunOutcome {
    pub fn terminated(result: Result<TaskRunResultPayload>) -> Self {
        Self {
            terminated: true,
            result,
        }
    }
}

/// Uniform interface through which the scheduler drives a task to completion.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executor name for logs
    fn name(&self) -> &'static str;

    /// Runs one attempt. Must not assume any state beyond what is already
    /// durable: the task payload and the backup/database rows.
    async fn run_once(&self, ctx: &ExecutionContext<'_>, task: &Task) -> TaskRunOutcome;

    /// False until the first `run_once` returns, then true forever.
    fn is_completed(&self) -> bool;

    /// Best effort; never blocks.
    fn progress(&self) -> Progress;
}

/// Write-once completion flag, readable from any task without a lock.
#[derive(Debug, Default)]
pub struct CompletionFlag(AtomicBool);

impl CompletionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Sets the flag when dropped, so it flips on every exit path of the
    /// attempt, including the future being dropped mid-flight.
    pub fn guard(&self) -> CompletionGuard<'_> {
        CompletionGuard(self)
    }
}

pub struct CompletionGuard<'a>(&'a CompletionFlag);

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.0.set();
    }
}
