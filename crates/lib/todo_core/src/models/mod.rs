//! Domain models shared by the controllers and the backend adapters.

pub mod auth;
pub mod task;

pub use auth::{Identity, PendingCredential, SignInMethod, SocialProvider};
pub use task::{NewTask, OwnerFilter, Snapshot, Task, TaskPatch};
