//! Task list view-model.
//!
//! Holds the task list for the active identity and turns user intents into
//! point writes. The list is only ever replaced by snapshots pushed through
//! the open subscription; writes never touch it directly, so a write shows up
//! once the store has round-tripped it.

use std::future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{DocumentStore, StoreError, Subscription};
use crate::models::{Identity, NewTask, OwnerFilter, Snapshot, Task, TaskPatch};
use crate::notify::Notifier;
use crate::session::IdentityObserver;

/// Task list errors. None of them are retried.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task text cannot be empty")]
    Validation,

    #[error("No signed-in user")]
    NotAuthenticated,

    #[error("Failed to add task: {0}")]
    AddFailed(#[source] StoreError),

    #[error("Failed to update task: {0}")]
    ToggleFailed(#[source] StoreError),

    #[error("Failed to delete task: {0}")]
    DeleteFailed(#[source] StoreError),

    #[error("Failed to subscribe to tasks: {0}")]
    Subscribe(#[source] StoreError),
}

/// The task list for the active identity.
pub struct TaskList {
    store: Arc<dyn DocumentStore>,
    notifier: Notifier,
    identity: Option<Identity>,
    subscription: Option<Subscription>,
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Notifier) -> Self {
        Self {
            store,
            notifier,
            identity: None,
            subscription: None,
            tasks: Vec::new(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Switch to `identity`, or to nobody.
    ///
    /// The previous subscription is cancelled before the next one is
    /// requested, so at most one is ever open. The local list is cleared and
    /// refilled by the new subscription's first snapshot. When the
    /// subscription cannot be opened the list stays unbound.
    pub fn rebind(&mut self, identity: Option<Identity>) -> Result<(), TaskError> {
        if let Some(previous) = self.subscription.take() {
            debug!(subscription = %previous.id(), "closing task subscription");
            previous.cancel();
        }
        self.tasks.clear();
        self.identity = None;

        let Some(identity) = identity else {
            info!("task list unbound");
            return Ok(());
        };
        let subscription = self
            .store
            .subscribe(&OwnerFilter::new(&identity.id))
            .map_err(TaskError::Subscribe)?;
        info!(user_id = %identity.id, subscription = %subscription.id(), "task list bound");
        self.identity = Some(identity);
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Replace the list with a pushed snapshot.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        debug!(count = snapshot.tasks.len(), "applying task snapshot");
        self.tasks = snapshot.into_tasks();
    }

    /// Wait for the next snapshot and apply it.
    ///
    /// Pends forever while no subscription is open. Returns `false` when the
    /// open subscription ended; the slot is released in that case. Cancel-safe.
    pub async fn next_snapshot(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return future::pending().await;
        };
        match subscription.next_snapshot().await {
            Some(snapshot) => {
                self.apply_snapshot(snapshot);
                true
            }
            None => {
                warn!("task subscription ended");
                self.subscription = None;
                false
            }
        }
    }

    /// Apply every snapshot already delivered, keeping only the effect of the
    /// last one. Returns how many were applied.
    pub fn drain_snapshots(&mut self) -> usize {
        let mut latest = None;
        let mut applied = 0;
        if let Some(subscription) = self.subscription.as_mut() {
            while let Some(snapshot) = subscription.try_next_snapshot() {
                latest = Some(snapshot);
                applied += 1;
            }
        }
        if let Some(snapshot) = latest {
            self.apply_snapshot(snapshot);
        }
        applied
    }

    /// Create a task with `text` for the active identity.
    pub async fn add_task(&mut self, text: &str) -> Result<String, TaskError> {
        if text.trim().is_empty() {
            self.notifier.warning("Task text cannot be empty");
            return Err(TaskError::Validation);
        }
        let Some(identity) = &self.identity else {
            return Err(TaskError::NotAuthenticated);
        };

        let new_task = NewTask::open(text, &identity.id);
        match self.store.create_task(&new_task).await {
            Ok(id) => {
                debug!(task_id = %id, "task created");
                self.notifier.success("Task added");
                Ok(id)
            }
            Err(e) => {
                self.notifier.error("Could not add the task", e.to_string());
                Err(TaskError::AddFailed(e))
            }
        }
    }

    /// Flip the completed flag of task `id`.
    ///
    /// Returns the requested new state, or `None` when `id` is not in the
    /// current list (nothing is written in that case).
    pub async fn toggle_task(&mut self, id: &str) -> Result<Option<bool>, TaskError> {
        let Some(task) = self.find(id) else {
            debug!(task_id = id, "toggle ignored, task not in list");
            return Ok(None);
        };
        let completed = !task.completed;

        match self
            .store
            .update_task(id, &TaskPatch::completed(completed))
            .await
        {
            Ok(()) => {
                self.notifier.info(if completed {
                    "Task completed"
                } else {
                    "Task marked as not completed"
                });
                Ok(Some(completed))
            }
            Err(e) => {
                self.notifier.error("Could not update the task", e.to_string());
                Err(TaskError::ToggleFailed(e))
            }
        }
    }

    /// Delete task `id`.
    pub async fn delete_task(&mut self, id: &str) -> Result<(), TaskError> {
        match self.store.delete_task(id).await {
            Ok(()) => {
                self.notifier.success("Task deleted");
                Ok(())
            }
            Err(e) => {
                self.notifier.error("Could not delete the task", e.to_string());
                Err(TaskError::DeleteFailed(e))
            }
        }
    }
}

impl IdentityObserver for TaskList {
    fn identity_changed(&mut self, identity: Option<&Identity>) {
        if let Err(e) = self.rebind(identity.cloned()) {
            warn!(error = %e, "could not bind task list");
            self.notifier.error("Could not load tasks", e.to_string());
        }
    }
}
