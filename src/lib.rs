//! Provider-agnostic data access.
//!
//! This library lets callers run parameterized queries and stored procedures
//! against any relational backend through a registered driver capability,
//! handling connection acquisition, transaction scoping and parameter
//! direction semantics the same way for every driver.
//!
//! ```ignore
//! use db_facade::{ConnectionManager, ConnectionSettings, ParameterSpec, ProviderRegistry};
//!
//! ProviderRegistry::global().register("pg", Arc::new(MyPgDriver::default()))?;
//!
//! let manager = ConnectionManager::new(
//!     ConnectionSettings::new("host=localhost dbname=app").with_provider("pg"),
//! )?;
//! let mut cmd = manager.create_query("SELECT name FROM users WHERE id = $1")?;
//! cmd.parameters_mut().push(ParameterSpec::input("$1", 5));
//! let name = cmd.execute_scalar()?;
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{ConnectionSettings, Credential, DEFAULT_PROVIDER_NAME};
pub use db::{Command, CommandKind, ConnectionManager, DriverCapability, ProviderRegistry};
pub use error::{DriverError, FacadeError, FacadeResult};
pub use models::{
    Column, DbType, ParameterDirection, ParameterSet, ParameterSpec, Record, RowMapper, RowSet,
    Value,
};
