//! # todo_core
//!
//! Core logic for the Todo client: the session controller, the task list
//! view-model, and the auth flow state machine, written against the
//! [`backend::IdentityProvider`] and [`backend::DocumentStore`] traits.

pub mod auth_flow;
pub mod backend;
pub mod models;
pub mod notify;
pub mod session;
pub mod tasks;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
