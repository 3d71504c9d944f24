//! Closing several resources with best-effort cleanup.
//!
//! Every multi-resource teardown in the workspace goes through these two
//! helpers so the same rules hold everywhere:
//!
//! - every item is closed, even after an earlier item failed
//! - [`close_all`] surfaces the first failure and logs the rest as suppressed
//! - [`close_while_handling_errors`] is for unwinding paths where another
//!   error is already propagating; it only logs

use std::fmt;

/// Closes every item, returning the first error.
///
/// Errors after the first are logged at `warn` level as suppressed.
///
/// # Errors
///
/// Returns the first error produced by `close`.
pub fn close_all<T, E, I, F>(items: I, mut close: F) -> Result<(), E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Result<(), E>,
    E: fmt::Display,
{
    let mut first: Option<E> = None;
    for item in items {
        if let Err(err) = close(item) {
            match first {
                None => first = Some(err),
                Some(_) => tracing::warn!(error = %err, "suppressed error while closing"),
            }
        }
    }
    first.map_or(Ok(()), Err)
}

/// Closes every item, logging and discarding all errors.
///
/// Used while another error is already being propagated.
pub fn close_while_handling_errors<T, E, I, F>(items: I, mut close: F)
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Result<(), E>,
    E: fmt::Display,
{
    for item in items {
        if let Err(err) = close(item) {
            tracing::warn!(error = %err, "ignored error while closing after failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_everything_and_returns_first_error() {
        let mut closed = Vec::new();
        let result = close_all(1..=4, |i| {
            closed.push(i);
            if i % 2 == 0 {
                Err(format!("failed {i}"))
            } else {
                Ok(())
            }
        });
        assert_eq!(closed, vec![1, 2, 3, 4]);
        assert_eq!(result, Err("failed 2".to_string()));
    }

    #[test]
    fn succeeds_when_nothing_fails() {
        let result: Result<(), String> = close_all(Vec::<u8>::new(), |_| Ok(()));
        assert!(result.is_ok());
    }

    #[test]
    fn handling_errors_still_visits_all() {
        let mut count = 0;
        close_while_handling_errors(0..3, |_| {
            count += 1;
            Err::<(), _>("boom")
        });
        assert_eq!(count, 3);
    }
}
