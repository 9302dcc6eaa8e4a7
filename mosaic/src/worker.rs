//! Worker thread plumbing shared by the MLE search and the refinement pipeline.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{Scope, ScopedJoinHandle};

use common::CancelToken;

use crate::error::{Error, Result};

/// Spawns a named scoped worker whose errors and panics become [`Error::WorkerFault`].
///
/// A failing worker cancels `stop` so its siblings wind down.
pub(crate) fn spawn_guarded<'scope, 'env, T, F>(
    scope: &'scope Scope<'scope, 'env>,
    name: String,
    stop: &CancelToken,
    body: F,
) -> ScopedJoinHandle<'scope, Result<T>>
where
    T: Send + 'scope,
    F: FnOnce() -> Result<T> + Send + 'scope,
{
    let stop = stop.clone();
    scope.spawn(move || {
        let result = match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(as_fault(&name, err)),
            Err(payload) => Err(Error::WorkerFault {
                worker: name.clone(),
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        };
        if let Err(err) = &result {
            tracing::warn!("{err}");
            stop.cancel();
        }
        result
    })
}

/// Joins a guarded worker. A join failure can only come from a panic that
/// escaped the guard, which is reported the same way.
pub(crate) fn join_guarded<T>(name: &str, handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle.join().unwrap_or_else(|payload| {
        Err(Error::WorkerFault {
            worker: name.to_string(),
            message: format!("panicked: {}", panic_message(payload.as_ref())),
        })
    })
}

fn as_fault(name: &str, err: Error) -> Error {
    match err {
        fault @ Error::WorkerFault { .. } => fault,
        other => Error::WorkerFault {
            worker: name.to_string(),
            message: other.to_string(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
