//! Stable exit codes for the `dune` binary.

/// Run finished, including handled outcomes such as a failed validation.
pub const OK: i32 = 0;
/// Unhandled error (bad configuration file, executor failure, I/O).
pub const FAILURE: i32 = 1;
/// Operator interrupt or end of input where an answer was required.
pub const INTERRUPTED: i32 = 130;

/// Exit code for a finished run.
pub fn for_result<T>(result: &anyhow::Result<T>) -> i32 {
    match result {
        Ok(_) => OK,
        Err(err) if crate::error::DuneError::is_interrupted(err) => INTERRUPTED,
        Err(_) => FAILURE,
    }
}
