/// Convenience result type used across easel.
pub type EaselResult<T> = Result<T, EaselError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum EaselError {
    /// Invalid user-provided document data or structural operation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Scheduler/pipeline contract violation. Aborts the current render pass.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// An external plugin (filter, brush) was referenced but is not registered.
    #[error("missing {kind} plugin '{id}'")]
    MissingPlugin {
        /// Plugin family (`"filter"`, `"brush"`).
        kind: &'static str,
        /// Plugin id as referenced by the document.
        id: String,
    },

    /// The render pass observed its cancellation signal.
    #[error("render pass cancelled")]
    Cancelled,

    /// Errors while decoding encoded pixel data.
    #[error("decode error: {0}")]
    Decode(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EaselError {
    /// Build a [`EaselError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`EaselError::Invariant`] value.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Build a [`EaselError::MissingPlugin`] value.
    pub fn missing_plugin(kind: &'static str, id: impl Into<String>) -> Self {
        Self::MissingPlugin {
            kind,
            id: id.into(),
        }
    }

    /// Build a [`EaselError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`EaselError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` for the cooperative cancellation signal, which is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// `true` for errors that degrade a single task instead of aborting the pass.
    pub fn is_missing_plugin(&self) -> bool {
        matches!(self, Self::MissingPlugin { .. })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
