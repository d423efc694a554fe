//! Data models for the facade.
//!
//! This module re-exports the driver-neutral types callers build commands
//! from and read results into.

pub mod parameter;
pub mod rowset;
pub mod value;

pub use parameter::{ParameterDirection, ParameterSet, ParameterSpec};
pub use rowset::{Column, Record, RowMapper, RowSet};
pub use value::{DbType, Value};
