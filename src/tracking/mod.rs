//! Keeps the in-memory state of today's workout and activities consistent with the gateway.
//!
//! Mutations are applied locally first and forwarded to a [coordinator::SaveCoordinator], which
//! debounces and persists them. Failures roll local state back to the last value the gateway
//! confirmed and are reported through a [notice::Notifier].

pub mod activity;
pub mod coordinator;
pub mod entities;
pub mod notice;
pub mod selection;
pub mod session;

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::gateway::{entities::TemplateId, GatewayError};

use entities::SetId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("No workout has been started for today")]
    NotStarted,
    #[error("Unknown set {0}")]
    UnknownSet(SetId),
    #[error("Exercise {0} is not in the plan of the selected group")]
    UnknownExercise(u32),
    #[error("Unknown activity template {0}")]
    UnknownTemplate(TemplateId),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Locks state shared with save tasks. Nothing panics while holding these locks, but a poisoned
/// lock still holds consistent state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
