//! Task document models.

use serde::{Deserialize, Serialize};

/// A task document as held by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned document id.
    pub id: String,
    pub text: String,
    pub completed: bool,
    /// Id of the identity that owns this task.
    pub owner_id: String,
}

/// Fields written when creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub text: String,
    pub completed: bool,
    pub owner_id: String,
}

impl NewTask {
    /// A new, not yet completed task owned by `owner_id`.
    pub fn open(text: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
            owner_id: owner_id.into(),
        }
    }

    /// Attach a store-assigned id.
    pub fn into_task(self, id: impl Into<String>) -> Task {
        Task {
            id: id.into(),
            text: self.text,
            completed: self.completed,
            owner_id: self.owner_id,
        }
    }
}

/// Partial update of a task document. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
        }
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }
}

/// Equality filter scoping a subscription to one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerFilter {
    pub owner_id: String,
}

impl OwnerFilter {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        task.owner_id == self.owner_id
    }
}

/// Full result set pushed by a subscription. Supersedes any earlier snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
}

impl Snapshot {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}
