//! Process supervision
//!
//! The cleanup reconciler and the HTTP server run as separate tasks sharing
//! one shutdown token. Serving launches without a live reconciler would leak
//! Services and Ingresses, so whichever task ends first cancels the token and
//! the other is drained before returning.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Error;

/// Wait for either task to end, stop the other, and report the first failure
///
/// Returns `Ok(())` only when both tasks stopped cleanly, i.e. after the
/// shutdown token was cancelled from outside.
pub async fn supervise(
    mut reconciler: JoinHandle<Result<(), Error>>,
    mut server: JoinHandle<Result<(), Error>>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let (first, second) = tokio::select! {
        result = &mut reconciler => {
            let first = finished("cleanup reconciler", result);
            shutdown.cancel();
            (first, finished("http server", server.await))
        }
        result = &mut server => {
            let first = finished("http server", result);
            shutdown.cancel();
            (first, finished("cleanup reconciler", reconciler.await))
        }
    };
    first.and(second)
}

fn finished(
    task: &str,
    result: Result<Result<(), Error>, tokio::task::JoinError>,
) -> Result<(), Error> {
    match result.map_err(Error::from).and_then(|r| r) {
        Ok(()) => {
            info!(task, "Task stopped");
            Ok(())
        }
        Err(e) => {
            error!(task, error = %e, "Task failed");
            Err(e)
        }
    }
}
