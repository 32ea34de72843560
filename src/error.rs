use std::path::PathBuf;
use thiserror::Error;

use crate::binding::Action;
use crate::types::WindowHandle;

/// Failures of the carousel core; none of them is fatal to the process
#[derive(Error, Debug)]
pub enum CarouselError {
    #[error("cannot start a session without any windows")]
    EmptySelection,

    #[error("failed to focus window {handle}: {reason}")]
    FocusApply { handle: WindowHandle, reason: String },

    #[error("failed to register {action} binding '{binding}': {reason}")]
    BindingRegistration {
        action: Action,
        binding: String,
        reason: String,
    },

    #[error("settings I/O failed for {}: {reason}", .path.display())]
    SettingsIo { path: PathBuf, reason: String },
}

impl CarouselError {
    pub fn focus_apply(handle: WindowHandle, err: &anyhow::Error) -> Self {
        CarouselError::FocusApply {
            handle,
            reason: format!("{err:#}"),
        }
    }

    pub fn binding_registration(action: Action, binding: impl ToString, reason: impl Into<String>) -> Self {
        CarouselError::BindingRegistration {
            action,
            binding: binding.to_string(),
            reason: reason.into(),
        }
    }

    pub fn settings_io(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        CarouselError::SettingsIo {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, CarouselError>;
