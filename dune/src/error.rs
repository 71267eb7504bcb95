//! Domain errors that callers branch on.
//!
//! Everything else (I/O, parsing, child processes) propagates as
//! `anyhow::Error` with context; these variants are wrapped into `anyhow` and
//! recovered with `downcast_ref` where a caller needs to tell them apart.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DuneError {
    /// No catalog provider reached the match threshold.
    #[error("no capability provider scored at or above the match threshold ({threshold})")]
    NoMatchingCapability { threshold: u32 },

    /// A configuration document failed structural checks.
    #[error("malformed configuration {origin}:\n- {}", .problems.join("\n- "))]
    MalformedConfiguration {
        origin: String,
        problems: Vec<String>,
    },

    /// The provider catalog failed validation on load.
    #[error("invalid catalog {origin}:\n- {}", .problems.join("\n- "))]
    InvalidCatalog {
        origin: String,
        problems: Vec<String>,
    },

    #[error("invalid document name '{name}': {reason}")]
    InvalidDocumentName { name: String, reason: String },

    /// Input ended while a mandatory answer was expected.
    #[error("interrupted by operator")]
    Interrupted,
}

impl DuneError {
    /// True if `err` (or anything it wraps) is [`DuneError::Interrupted`].
    pub fn is_interrupted(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<DuneError>(), Some(DuneError::Interrupted))
    }

    pub fn is_no_match(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<DuneError>(),
            Some(DuneError::NoMatchingCapability { .. })
        )
    }

    /// Itemized problems carried by a [`DuneError::MalformedConfiguration`].
    pub fn malformed_problems(err: &anyhow::Error) -> Option<&[String]> {
        match err.downcast_ref::<DuneError>() {
            Some(DuneError::MalformedConfiguration { problems, .. }) => Some(problems),
            _ => None,
        }
    }
}
