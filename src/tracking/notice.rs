use std::{fmt::Display, sync::Arc};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

use crate::gateway::{entities::TemplateId, GatewayError};

use super::entities::SetId;

/// User facing report of a background failure. By the time a notice is sent the local state
/// has already been rolled back.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    SetSaveFailed {
        set: SetId,
        exercise_name: Arc<str>,
        set_number: u32,
        error: GatewayError,
    },
    CompletionSaveFailed {
        template_id: TemplateId,
        error: GatewayError,
    },
}

impl Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::SetSaveFailed {
                exercise_name,
                set_number,
                error,
                ..
            } => write!(
                f,
                "Failed to save set {set_number} of {exercise_name}: {error}"
            ),
            Notice::CompletionSaveFailed { template_id, error } => {
                write!(f, "Failed to update activity {template_id}: {error}")
            }
        }
    }
}

/// Side channel carrying [Notice]s to the presentation layer.
#[derive(Clone)]
pub struct Notifier {
    sender: UnboundedSender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Notifier, UnboundedReceiver<Notice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Notifier { sender }, receiver)
    }

    pub fn report(&self, notice: Notice) {
        error!("{notice}");
        if self.sender.send(notice).is_err() {
            debug!("Nobody is listening for notices");
        }
    }
}
