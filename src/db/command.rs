//! Commands: parameter marshalling and the execution protocol.
//!
//! Every execution method follows the same protocol:
//! 1. map the parameter set onto the native command,
//! 2. lease a connection from the manager and bind it,
//! 3. run the native command (directly or through a bulk adapter),
//! 4. copy directional parameter values back,
//! 5. give the connection back to the manager.
//!
//! Step 5 runs on every exit path, including unwinding, through `ConnectedScope`.

use crate::db::driver::{CancelHandle, CommandKind, NativeCommand};
use crate::db::manager::{ConnectionLease, ConnectionManager};
use crate::error::{FacadeError, FacadeResult};
use crate::models::{ParameterSet, Record, RowMapper, RowSet, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A query or stored procedure call bound to a `ConnectionManager`.
///
/// The native command handle is released when the command is dropped or
/// `dispose`d, whichever comes first.
pub struct Command {
    manager: ConnectionManager,
    native: Option<Box<dyn NativeCommand>>,
    parameters: ParameterSet,
    text: String,
    kind: CommandKind,
}

impl Command {
    pub(crate) fn new(
        manager: ConnectionManager,
        text: String,
        kind: CommandKind,
    ) -> FacadeResult<Self> {
        let mut native = manager.create_native_command()?;
        native.set_command_text(&text);
        native.set_command_kind(kind);
        if let Some(secs) = manager.settings().command_timeout_secs {
            native.set_timeout_secs(secs);
        }

        Ok(Self {
            manager,
            native: Some(native),
            parameters: ParameterSet::new(),
            text,
            kind,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.parameters
    }

    /// Timeout in seconds, as held by the native command.
    pub fn timeout_secs(&self) -> FacadeResult<u32> {
        Ok(self.native()?.timeout_secs())
    }

    pub fn set_timeout_secs(&mut self, secs: u32) -> FacadeResult<()> {
        self.native_mut()?.set_timeout_secs(secs);
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.native.is_none()
    }

    /// Release the native command handle. Later calls do nothing.
    pub fn dispose(&mut self) {
        if let Some(native) = self.native.take() {
            drop(native);
            debug!(command = %self.text, "Native command released");
        }
    }

    // =========================================================================
    // Parameter marshalling
    // =========================================================================

    /// Replace the native parameters with one per entry of the parameter set.
    pub fn map_to_native(&mut self) -> FacadeResult<()> {
        let native = self
            .native
            .as_deref_mut()
            .ok_or(FacadeError::CommandReleased)?;
        map_to_native(&self.manager, native, &self.parameters)
    }

    /// Copy output, input-output and return values back from the native parameters.
    pub fn map_from_native(&mut self) -> FacadeResult<()> {
        let native = self.native.as_deref().ok_or(FacadeError::CommandReleased)?;
        map_from_native(native, &mut self.parameters);
        Ok(())
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute and return the number of affected rows.
    pub fn execute(&mut self) -> FacadeResult<u64> {
        self.run("execute", |_, native| Ok(native.execute_non_query()?))
    }

    /// First column of the first row of the first result, `None` if there are no rows.
    pub fn execute_scalar(&mut self) -> FacadeResult<Option<Value>> {
        self.run("execute_scalar", |_, native| Ok(native.execute_scalar()?))
    }

    /// The first tabular result. Empty if the command produced none.
    pub fn retrieve_rowset(&mut self) -> FacadeResult<RowSet> {
        self.run("retrieve_rowset", |manager, native| {
            let mut adapter = manager.create_bulk_adapter()?;
            let rowsets = adapter.fill(native)?;
            Ok(rowsets.into_iter().next().unwrap_or_default())
        })
    }

    /// Every tabular result, in order.
    pub fn retrieve_all_rowsets(&mut self) -> FacadeResult<Vec<RowSet>> {
        self.run("retrieve_all_rowsets", |manager, native| {
            let mut adapter = manager.create_bulk_adapter()?;
            Ok(adapter.fill(native)?)
        })
    }

    /// Rows of the first result as ordered column-name to value records.
    pub fn retrieve_records(&mut self) -> FacadeResult<Vec<Record>> {
        Ok(self.retrieve_rowset()?.records())
    }

    /// Rows of the first result mapped through an explicit column mapping.
    pub fn retrieve_list<T>(&mut self, mapper: &RowMapper<T>) -> FacadeResult<Vec<T>> {
        Ok(mapper.map(&self.retrieve_rowset()?))
    }

    fn run<T>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&ConnectionManager, &mut dyn NativeCommand) -> FacadeResult<T>,
    ) -> FacadeResult<T> {
        let native = self
            .native
            .as_deref_mut()
            .ok_or(FacadeError::CommandReleased)?;

        let start = Instant::now();
        debug!(
            command = %self.text,
            kind = ?self.kind,
            operation,
            params = self.parameters.len(),
            "Executing command"
        );

        match run_protocol(&self.manager, native, &mut self.parameters, op) {
            Ok(value) => {
                debug!(
                    operation,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Command completed"
                );
                Ok(value)
            }
            Err(err) => Err(FacadeError::execution(self.text.clone(), err)),
        }
    }

    fn native(&self) -> FacadeResult<&dyn NativeCommand> {
        self.native.as_deref().ok_or(FacadeError::CommandReleased)
    }

    fn native_mut(&mut self) -> FacadeResult<&mut dyn NativeCommand> {
        match self.native.as_deref_mut() {
            Some(native) => Ok(native),
            None => Err(FacadeError::CommandReleased),
        }
    }

    pub(crate) fn cancel_handle(&self) -> Option<Arc<dyn CancelHandle>> {
        self.native.as_ref().and_then(|native| native.cancel_handle())
    }

    /// Move the native handle and parameters into a new command so they can be
    /// executed on another thread. This command is left released until
    /// `reattach` hands them back.
    pub(crate) fn detach(&mut self) -> FacadeResult<Command> {
        let native = self.native.take().ok_or(FacadeError::CommandReleased)?;
        Ok(Command {
            manager: self.manager.clone(),
            native: Some(native),
            parameters: std::mem::take(&mut self.parameters),
            text: self.text.clone(),
            kind: self.kind,
        })
    }

    pub(crate) fn reattach(&mut self, mut detached: Command) {
        self.native = detached.native.take();
        self.parameters = std::mem::take(&mut detached.parameters);
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("parameters", &self.parameters)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Holds a leased connection and gives it back when released or dropped.
struct ConnectedScope<'a> {
    manager: &'a ConnectionManager,
    native: &'a mut dyn NativeCommand,
    lease: Option<ConnectionLease>,
}

impl ConnectedScope<'_> {
    fn release(&mut self) -> FacadeResult<()> {
        match self.lease.take() {
            Some(lease) => self.manager.disconnect(&mut *self.native, lease),
            None => Ok(()),
        }
    }
}

impl Drop for ConnectedScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "Failed to release connection while unwinding");
        }
    }
}

fn run_protocol<T>(
    manager: &ConnectionManager,
    native: &mut dyn NativeCommand,
    parameters: &mut ParameterSet,
    op: impl FnOnce(&ConnectionManager, &mut dyn NativeCommand) -> FacadeResult<T>,
) -> FacadeResult<T> {
    map_to_native(manager, native, parameters)?;

    let lease = manager.connect()?;
    native.set_connection(Some(lease.connection().clone()));
    let mut scope = ConnectedScope {
        manager,
        native,
        lease: Some(lease),
    };

    let outcome = op(manager, &mut *scope.native).map(|value| {
        map_from_native(&*scope.native, parameters);
        value
    });
    let released = scope.release();

    match outcome {
        Ok(value) => released.map(|()| value),
        Err(err) => {
            if let Err(release_err) = released {
                warn!(error = %release_err, "Failed to release connection after execution error");
            }
            Err(err)
        }
    }
}

fn map_to_native(
    manager: &ConnectionManager,
    native: &mut dyn NativeCommand,
    parameters: &ParameterSet,
) -> FacadeResult<()> {
    // Unnamed parameters are positional and may repeat.
    let mut seen = HashSet::with_capacity(parameters.len());
    for spec in parameters {
        if !spec.name.is_empty() && !seen.insert(spec.name.as_str()) {
            return Err(FacadeError::parameter_mapping(
                &spec.name,
                "duplicate parameter name",
            ));
        }
        if !spec.db_type.accepts(&spec.value) {
            return Err(FacadeError::parameter_mapping(
                &spec.name,
                format!(
                    "{} value cannot be sent as {}",
                    spec.value.type_name(),
                    spec.db_type
                ),
            ));
        }
    }

    native.clear_parameters();
    for spec in parameters {
        let mut param = manager.create_parameter()?;
        param.set_name(spec.name.clone());
        param.set_value(spec.value.clone());
        param.set_db_type(spec.db_type);
        param.set_direction(spec.direction);
        native.add_parameter(param);
    }
    debug!(count = parameters.len(), "Parameters mapped to native command");
    Ok(())
}

fn map_from_native(native: &dyn NativeCommand, parameters: &mut ParameterSet) {
    let mut copied = 0usize;
    for param in native.parameters() {
        if !param.direction().is_directional() {
            continue;
        }
        if let Some(spec) = parameters.get_mut(param.name()) {
            if spec.direction.is_directional() {
                spec.value = param.value().clone();
                copied += 1;
            }
        }
    }
    if copied > 0 {
        debug!(copied, "Directional parameter values copied back");
    }
}
