pub mod cache;
pub mod monitoring;
pub mod session;

pub use tracing;

/// Logs the error of a `Result` and hands the `Result` back untouched.
/// ```rust
/// use explorer_common::log_if_error;
///
/// let value: Result<u64, String> = log_if_error!(Err("node unreachable".to_string()));
/// ```
#[macro_export]
macro_rules! log_if_error {
    ($e: expr) => {
        match $e {
            Ok(v) => Ok(v),
            Err(e) => {
                $crate::tracing::error!(message = %e);
                Err(e)
            },
        }
    };
}
