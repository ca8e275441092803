//! Helpers for asserting on streams of results.
//!
//! Callbacks return `Result` so that a failed check surfaces as the error of the
//! whole observation instead of getting lost inside the stream.

use std::ops::ControlFlow;
use std::pin::pin;
use std::time::Duration;

use futures::Stream;
use futures::StreamExt;
use tower::BoxError;

/// Checks one result; see [`observe_results`].
pub type ResultCallback<T> = Box<dyn FnOnce(&T) -> Result<(), BoxError> + Send>;

/// Checks one error; see [`observe_results`].
pub type ErrorCallback<E> = Box<dyn FnOnce(&E) -> Result<(), BoxError> + Send>;

/// How [`observe_results`] finishes.
pub struct ObserveOptions<E> {
    /// Once every callback ran, keep listening this long for unexpected extra
    /// items. `None` returns right away.
    pub wait: Option<Duration>,
    /// Callbacks for the expected errors, in order.
    pub error_callbacks: Vec<ErrorCallback<E>>,
}

impl<E> Default for ObserveOptions<E> {
    fn default() -> Self {
        Self {
            wait: Some(Duration::ZERO),
            error_callbacks: Vec::new(),
        }
    }
}

/// Runs `callback` on every result of `stream` with its 1-based position.
///
/// Stops when the callback breaks or the stream ends, and returns how many
/// results were seen. An error item or a failing callback ends the observation
/// with that error.
pub async fn subscribe_and_count<S, T, E, F>(stream: S, mut callback: F) -> Result<usize, BoxError>
where
    S: Stream<Item = Result<T, E>>,
    E: Into<BoxError>,
    F: FnMut(usize, T) -> Result<ControlFlow<()>, BoxError>,
{
    let mut stream = pin!(stream);
    let mut count = 0;
    while let Some(item) = stream.next().await {
        count += 1;
        let result = item.map_err(Into::<BoxError>::into)?;
        if callback(count, result)?.is_break() {
            break;
        }
    }
    tracing::trace!(count, "stopped counting results");
    Ok(count)
}

/// Feeds the items of `stream` to one callback each, in order.
///
/// Results go to `callbacks`, errors to `options.error_callbacks`. Once both
/// lists are used up the observation succeeds with the results seen, unless an
/// extra item arrives within `options.wait`. It fails if a callback fails, if
/// an item has no callback left, or if the stream ends early.
pub async fn observe_results<S, T, E>(
    stream: S,
    options: ObserveOptions<E>,
    callbacks: Vec<ResultCallback<T>>,
) -> Result<Vec<T>, BoxError>
where
    S: Stream<Item = Result<T, E>>,
    E: Into<BoxError>,
{
    let expected_results = callbacks.len();
    let expected_errors = options.error_callbacks.len();
    let mut callbacks = callbacks.into_iter();
    let mut error_callbacks = options.error_callbacks.into_iter();
    let mut stream = pin!(stream);
    let mut results = Vec::with_capacity(expected_results);
    let mut errors = 0;

    while results.len() < expected_results || errors < expected_errors {
        match stream.next().await {
            Some(Ok(result)) => {
                let Some(callback) = callbacks.next() else {
                    return Err(format!("observed more than {expected_results} results").into());
                };
                callback(&result)?;
                results.push(result);
            }
            Some(Err(error)) => {
                let Some(callback) = error_callbacks.next() else {
                    return Err(error.into());
                };
                callback(&error)?;
                errors += 1;
            }
            None => {
                return Err(format!(
                    "stream ended after {} of {expected_results} results and {errors} of {expected_errors} errors",
                    results.len()
                )
                .into());
            }
        }
    }

    if let Some(wait) = options.wait {
        match tokio::time::timeout(wait, stream.next()).await {
            Ok(Some(Ok(_))) => {
                return Err(format!("observed more than {expected_results} results").into());
            }
            Ok(Some(Err(error))) => return Err(error.into()),
            Ok(None) | Err(_) => {}
        }
    }
    Ok(results)
}
