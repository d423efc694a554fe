//! Awaitable execution variants.
//!
//! Drivers are blocking, so each variant detaches the command's native handle
//! and parameters, runs the regular execution protocol on tokio's blocking
//! pool, and reattaches them when the task finishes.
//!
//! If the returned future is dropped before completion, the native command's
//! cancel handle (when the driver provides one) is triggered. The protocol
//! still runs to the end on the blocking thread, so the connection is always
//! given back; the native handle is then released with the detached command
//! and the caller's `Command` stays released.

use crate::db::command::Command;
use crate::db::driver::CancelHandle;
use crate::error::{FacadeError, FacadeResult};
use crate::models::{Record, RowSet, Value};
use std::sync::Arc;
use tracing::debug;

/// Cancels the native command if dropped while armed.
struct CancelOnDrop {
    handle: Option<Arc<dyn CancelHandle>>,
}

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Execution future dropped, cancelling native command");
            handle.cancel();
        }
    }
}

impl Command {
    pub async fn execute_async(&mut self) -> FacadeResult<u64> {
        self.run_blocking(Command::execute).await
    }

    pub async fn execute_scalar_async(&mut self) -> FacadeResult<Option<Value>> {
        self.run_blocking(Command::execute_scalar).await
    }

    pub async fn retrieve_rowset_async(&mut self) -> FacadeResult<RowSet> {
        self.run_blocking(Command::retrieve_rowset).await
    }

    pub async fn retrieve_all_rowsets_async(&mut self) -> FacadeResult<Vec<RowSet>> {
        self.run_blocking(Command::retrieve_all_rowsets).await
    }

    pub async fn retrieve_records_async(&mut self) -> FacadeResult<Vec<Record>> {
        self.run_blocking(Command::retrieve_records).await
    }

    async fn run_blocking<T, F>(&mut self, op: F) -> FacadeResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Command) -> FacadeResult<T> + Send + 'static,
    {
        let mut detached = self.detach()?;
        let mut guard = CancelOnDrop {
            handle: detached.cancel_handle(),
        };

        let joined = tokio::task::spawn_blocking(move || {
            let result = op(&mut detached);
            (detached, result)
        })
        .await;
        guard.disarm();

        match joined {
            Ok((detached, result)) => {
                self.reattach(detached);
                result
            }
            Err(err) => Err(FacadeError::execution(
                self.text(),
                FacadeError::internal(format!("execution task failed: {err}")),
            )),
        }
    }
}
