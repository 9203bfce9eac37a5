use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("Firebase: {}", .0)]
    Firebase(#[from] todo_firebase::FirebaseError),

    #[error("Logging: {}", .0)]
    Logging(String),
}
