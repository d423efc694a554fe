//! Driver capability contract.
//!
//! A driver is registered once per provider name and produces native handles:
//! connections, commands, parameters, and bulk-fetch adapters. The facade never
//! depends on anything beyond these traits.
//!
//! Native connections are shared (`Arc`) because a connection pinned by an
//! active transaction is bound to every command executed under it. Drivers are
//! expected to use interior mutability on their connection type.

use crate::error::DriverError;
use crate::models::{DbType, ParameterDirection, RowSet, Value};
use std::sync::Arc;

/// An open native connection, shared between the manager and the commands bound to it.
pub type SharedConnection = Arc<dyn NativeConnection>;

/// Whether a command's text is ad hoc SQL or a stored procedure name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandKind {
    #[default]
    Text,
    StoredProcedure,
}

/// Factory for every native handle of one backend.
pub trait DriverCapability: Send + Sync {
    /// Create a connection for the given connection string and open it.
    fn open_connection(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn NativeConnection>, DriverError>;

    fn create_command(&self) -> Result<Box<dyn NativeCommand>, DriverError>;

    fn create_parameter(&self) -> Box<dyn NativeParameter>;

    fn create_bulk_adapter(&self) -> Result<Box<dyn BulkAdapter>, DriverError>;
}

pub trait NativeConnection: Send + Sync {
    /// Start a transaction on this connection.
    fn begin_transaction(&self) -> Result<Box<dyn NativeTransaction>, DriverError>;

    fn close(&self) -> Result<(), DriverError>;
}

/// A native transaction. Dropping the box releases the handle.
pub trait NativeTransaction: Send {
    fn commit(self: Box<Self>) -> Result<(), DriverError>;

    fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}

pub trait NativeParameter: Send {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);

    fn value(&self) -> &Value;
    fn set_value(&mut self, value: Value);

    fn db_type(&self) -> DbType;
    fn set_db_type(&mut self, db_type: DbType);

    fn direction(&self) -> ParameterDirection;
    fn set_direction(&mut self, direction: ParameterDirection);
}

pub trait NativeCommand: Send {
    fn command_text(&self) -> &str;
    fn set_command_text(&mut self, text: &str);

    fn command_kind(&self) -> CommandKind;
    fn set_command_kind(&mut self, kind: CommandKind);

    /// Timeout in seconds, enforced by the driver.
    fn timeout_secs(&self) -> u32;
    fn set_timeout_secs(&mut self, secs: u32);

    fn parameters(&self) -> &[Box<dyn NativeParameter>];
    fn clear_parameters(&mut self);
    fn add_parameter(&mut self, parameter: Box<dyn NativeParameter>);

    fn connection(&self) -> Option<&SharedConnection>;
    fn set_connection(&mut self, connection: Option<SharedConnection>);

    /// Execute and return the number of affected rows.
    fn execute_non_query(&mut self) -> Result<u64, DriverError>;

    /// First column of the first row of the first result, `None` when there are no rows.
    fn execute_scalar(&mut self) -> Result<Option<Value>, DriverError>;

    /// Handle that aborts an in-flight execution from another thread.
    fn cancel_handle(&self) -> Option<Arc<dyn CancelHandle>> {
        None
    }
}

pub trait CancelHandle: Send + Sync {
    fn cancel(&self);
}

/// Runs a command and collects every tabular result it produces.
pub trait BulkAdapter: Send {
    fn fill(&mut self, command: &mut dyn NativeCommand) -> Result<Vec<RowSet>, DriverError>;
}
