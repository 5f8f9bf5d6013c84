use thiserror::Error;

use crate::coordinator::queues::QueueError;
use crate::coordinator::router::RouterError;
use crate::event_bus::EventError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Router error: {0}")]
    Router(#[from] RouterError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Builder error: {0}")]
    Builder(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CoordinationResult<T> = Result<T, Error>;

// Helpers for the common string-carrying variants.
impl Error {
    pub fn builder<S: Into<String>>(message: S) -> Self {
        Error::Builder(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
