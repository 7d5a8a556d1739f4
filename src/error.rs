use thiserror::Error;

/// Expected, recoverable failure of a single action.
///
/// Returned from `verify`, or wrapped in the `anyhow::Error` returned from
/// `run`. The step runner downcasts to this type to tell operational failures
/// (tolerated when a step sets `allow_failure`) apart from programming errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Invalid(message) | Self::Failed(message) => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("'not' at token {position} is not followed by a condition name")]
    DanglingNot { position: usize },
    #[error("'not' at token {position} is followed by another 'not'")]
    DoubleNot { position: usize },
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Invalid build steps name {0}")]
    MissingSteps(String),
    #[error("Build steps '{name}' could not be read: {reason}")]
    InvalidSteps { name: String, reason: String },
    #[error("action class ({class}) could not be found! Available actions: {available}")]
    UnknownAction {
        module: String,
        class: String,
        available: String,
    },
    #[error("Invalid conditional statement in step ({step}): {source}")]
    MalformedCondition {
        step: String,
        #[source]
        source: ConditionError,
    },
    #[error("{message}")]
    StepFailed { step: String, message: String },
}
