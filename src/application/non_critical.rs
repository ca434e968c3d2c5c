use std::fmt::Display;
use std::future::Future;

/// Runs a side effect whose failure must not abort the enclosing operation.
///
/// History rows, counter updates and notifications go through here. The
/// error is logged with `context` and swallowed; the success value, if any,
/// is handed back.
pub async fn run_non_critical<F, T, E>(context: &str, step: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match step.await {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(context, %error, "non-critical step failed");
            None
        }
    }
}
