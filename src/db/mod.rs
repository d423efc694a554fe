//! Driver-neutral database access.
//!
//! This module provides:
//! - The driver capability contract implemented per backend
//! - The provider registry mapping names to drivers
//! - Connection and transaction management
//! - Commands with parameter marshalling and execution
//! - Awaitable execution variants

pub mod command;
pub mod driver;
pub mod manager;
pub mod registry;
pub mod task;

pub use command::Command;
pub use driver::{
    BulkAdapter, CancelHandle, CommandKind, DriverCapability, NativeCommand, NativeConnection,
    NativeParameter, NativeTransaction, SharedConnection,
};
pub use manager::{ConnectionLease, ConnectionManager, LeaseKind, TransactionMetadata};
pub use registry::ProviderRegistry;
