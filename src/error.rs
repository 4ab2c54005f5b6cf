use thiserror::Error;

/// Failure of a single bridge call.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{0}")]
    Rejected(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid payload for {command}: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend disconnected")]
    Disconnected,
}

impl BridgeError {
    pub fn rejected(message: impl Into<String>) -> Self {
        BridgeError::Rejected(message.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("value cannot be empty")]
    Empty,

    #[error("value must stay on a single line")]
    Multiline,
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("{label}: {error}")]
    Validation {
        field_id: String,
        label: String,
        error: FieldError,
    },

    #[error("{label} changed on disk and could not be matched; discard it and edit again")]
    Orphaned { field_id: String, label: String },

    #[error("save failed: {0}")]
    Backend(#[from] BridgeError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinError {
    #[error("Incorrect PIN. {attempts_remaining} attempt(s) remaining.")]
    Invalid { attempts_remaining: u32 },

    #[error("Too many attempts. Try again in {}.", format_lockout(*seconds))]
    LockedOut { seconds: u64 },

    #[error("PIN check failed: {0}")]
    Backend(String),
}

fn format_lockout(seconds: u64) -> String {
    if seconds >= 60 {
        let minutes = seconds.div_ceil(60);
        format!("{minutes} min")
    } else {
        format!("{seconds} s")
    }
}
