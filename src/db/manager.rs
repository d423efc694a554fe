//! Connection and transaction lifecycle.
//!
//! A `ConnectionManager` owns one connection target. Every execution asks it for
//! a connection and hands the connection back when done; the manager decides
//! whether that means opening and closing a private connection or lending out
//! the connection pinned by the active transaction.
//!
//! Transactions never nest: beginning one while another is active rolls the
//! previous one back first. Transaction control is serialized by a mutex, while
//! executions outside a transaction each open their own connection and proceed
//! independently.

use crate::config::ConnectionSettings;
use crate::db::command::Command;
use crate::db::driver::{
    BulkAdapter, CommandKind, DriverCapability, NativeCommand, NativeParameter, NativeTransaction,
    SharedConnection,
};
use crate::db::registry::ProviderRegistry;
use crate::error::{FacadeError, FacadeResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a leased connection came from, and so who closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseKind {
    /// Opened for one execution; closed on disconnect.
    Private,
    /// Pinned by the active transaction; left open on disconnect.
    Transaction,
}

/// A connection handed out by `ConnectionManager::connect`.
///
/// Must be given back through `ConnectionManager::disconnect`.
#[must_use = "a leased connection must be returned through disconnect"]
pub struct ConnectionLease {
    connection: SharedConnection,
    kind: LeaseKind,
}

impl ConnectionLease {
    pub fn connection(&self) -> &SharedConnection {
        &self.connection
    }

    pub fn kind(&self) -> LeaseKind {
        self.kind
    }

    pub fn is_transactional(&self) -> bool {
        self.kind == LeaseKind::Transaction
    }
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Metadata about the active transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionMetadata {
    /// Unique transaction identifier
    pub transaction_id: String,
    pub provider: String,
    pub started_at: DateTime<Utc>,
    /// Seconds since transaction started
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Commit,
    Rollback,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit => write!(f, "committed"),
            Self::Rollback => write!(f, "rolled back"),
        }
    }
}

struct ActiveTransaction {
    id: String,
    transaction: Box<dyn NativeTransaction>,
    connection: SharedConnection,
    started_at: DateTime<Utc>,
    created_at: Instant,
}

impl ActiveTransaction {
    /// End the transaction and close its pinned connection.
    ///
    /// The connection is closed even when the commit or rollback fails; the
    /// first failure is returned.
    fn finish(self, outcome: Outcome) -> FacadeResult<()> {
        let Self {
            id,
            transaction,
            connection,
            created_at,
            ..
        } = self;

        let ended = match outcome {
            Outcome::Commit => transaction.commit(),
            Outcome::Rollback => transaction.rollback(),
        };
        let closed = connection.close();

        match (ended, closed) {
            (Err(err), closed) => {
                if let Err(close_err) = closed {
                    warn!(
                        transaction_id = %id,
                        error = %close_err,
                        "Failed to close transaction connection"
                    );
                }
                Err(FacadeError::from(err))
            }
            (Ok(()), Err(close_err)) => Err(FacadeError::connection(
                "failed to close transaction connection",
                close_err,
            )),
            (Ok(()), Ok(())) => {
                info!(
                    transaction_id = %id,
                    elapsed_ms = created_at.elapsed().as_millis() as u64,
                    "Transaction {}",
                    outcome
                );
                Ok(())
            }
        }
    }
}

struct ManagerInner {
    registry: ProviderRegistry,
    settings: ConnectionSettings,
    driver: OnceLock<Arc<dyn DriverCapability>>,
    /// Connection string with credentials merged, built on first use
    connection_string: OnceLock<String>,
    transaction: Mutex<Option<ActiveTransaction>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(active) = self.transaction.get_mut().take() {
            warn!(
                transaction_id = %active.id,
                "Manager dropped with an active transaction, rolling back"
            );
            if let Err(err) = active.finish(Outcome::Rollback) {
                warn!(error = %err, "Rollback during teardown failed");
            }
        }
    }
}

/// Connection and transaction manager for one connection target.
///
/// Cloning yields another handle to the same manager; commands hold such a
/// handle. The active transaction is rolled back when the last handle drops.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Create a manager that resolves its provider in the process-wide registry.
    pub fn new(settings: ConnectionSettings) -> FacadeResult<Self> {
        Self::with_registry(ProviderRegistry::global().clone(), settings)
    }

    /// Create a manager bound to a specific registry.
    pub fn with_registry(
        registry: ProviderRegistry,
        settings: ConnectionSettings,
    ) -> FacadeResult<Self> {
        settings.validate()?;
        debug!(
            connection = %settings.display_name(),
            provider = %settings.resolved_provider_name(),
            "Connection manager created"
        );
        Ok(Self {
            inner: Arc::new(ManagerInner {
                registry,
                settings,
                driver: OnceLock::new(),
                connection_string: OnceLock::new(),
                transaction: Mutex::new(None),
            }),
        })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    pub fn provider_name(&self) -> &str {
        self.inner.settings.resolved_provider_name()
    }

    // =========================================================================
    // Command factory
    // =========================================================================

    /// Create an ad hoc query.
    pub fn create_query(&self, text: impl Into<String>) -> FacadeResult<Command> {
        Command::new(self.clone(), text.into(), CommandKind::Text)
    }

    /// Create a stored procedure call.
    pub fn create_procedure(&self, name: impl Into<String>) -> FacadeResult<Command> {
        Command::new(self.clone(), name.into(), CommandKind::StoredProcedure)
    }

    /// The driver bound to this manager, resolved on first use.
    pub(crate) fn driver(&self) -> FacadeResult<Arc<dyn DriverCapability>> {
        if let Some(driver) = self.inner.driver.get() {
            return Ok(driver.clone());
        }
        let provider = self.provider_name();
        let driver = self
            .inner
            .registry
            .resolve(provider)
            .map_err(|err| FacadeError::driver_resolution(provider, err))?;
        Ok(self.inner.driver.get_or_init(|| driver).clone())
    }

    pub(crate) fn create_native_command(&self) -> FacadeResult<Box<dyn NativeCommand>> {
        Ok(self.driver()?.create_command()?)
    }

    pub(crate) fn create_parameter(&self) -> FacadeResult<Box<dyn NativeParameter>> {
        Ok(self.driver()?.create_parameter())
    }

    pub(crate) fn create_bulk_adapter(&self) -> FacadeResult<Box<dyn BulkAdapter>> {
        Ok(self.driver()?.create_bulk_adapter()?)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Open a connection and begin a transaction on it.
    ///
    /// An already active transaction is rolled back first.
    pub fn begin_transaction(&self) -> FacadeResult<()> {
        let mut slot = self.inner.transaction.lock();

        if let Some(previous) = slot.take() {
            warn!(
                transaction_id = %previous.id,
                "Transaction already active, rolling it back before beginning a new one"
            );
            previous.finish(Outcome::Rollback)?;
        }

        let connection = self.open_connection()?;
        let transaction = match connection.begin_transaction() {
            Ok(transaction) => transaction,
            Err(err) => {
                if let Err(close_err) = connection.close() {
                    warn!(error = %close_err, "Failed to close connection after failed begin");
                }
                return Err(FacadeError::connection("failed to begin transaction", err));
            }
        };

        let id = generate_transaction_id();
        info!(
            transaction_id = %id,
            provider = %self.provider_name(),
            "Transaction started"
        );
        *slot = Some(ActiveTransaction {
            id,
            transaction,
            connection,
            started_at: Utc::now(),
            created_at: Instant::now(),
        });
        Ok(())
    }

    /// Commit the active transaction. No-op when none is active.
    pub fn commit(&self) -> FacadeResult<()> {
        self.end_transaction(Outcome::Commit)
    }

    /// Roll back the active transaction. No-op when none is active.
    pub fn rollback(&self) -> FacadeResult<()> {
        self.end_transaction(Outcome::Rollback)
    }

    fn end_transaction(&self, outcome: Outcome) -> FacadeResult<()> {
        let mut slot = self.inner.transaction.lock();
        match slot.take() {
            Some(active) => active.finish(outcome),
            None => {
                debug!("No active transaction, nothing {}", outcome);
                Ok(())
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.transaction.lock().is_some()
    }

    pub fn transaction_info(&self) -> Option<TransactionMetadata> {
        self.inner
            .transaction
            .lock()
            .as_ref()
            .map(|active| TransactionMetadata {
                transaction_id: active.id.clone(),
                provider: self.provider_name().to_string(),
                started_at: active.started_at,
                duration_secs: active.created_at.elapsed().as_secs(),
            })
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Lease a connection for one execution.
    ///
    /// Outside a transaction a new connection is opened and the caller owns it
    /// until `disconnect`. Inside one, the transaction's connection is shared.
    pub fn connect(&self) -> FacadeResult<ConnectionLease> {
        if let Some(active) = self.inner.transaction.lock().as_ref() {
            debug!(transaction_id = %active.id, "Reusing transaction connection");
            return Ok(ConnectionLease {
                connection: active.connection.clone(),
                kind: LeaseKind::Transaction,
            });
        }

        let connection = self.open_connection()?;
        debug!(provider = %self.provider_name(), "Connection opened");
        Ok(ConnectionLease {
            connection,
            kind: LeaseKind::Private,
        })
    }

    /// Give back a leased connection and detach it from the command.
    ///
    /// Private connections are closed; a transaction's connection stays open.
    /// The command is detached even when closing fails.
    pub fn disconnect(
        &self,
        command: &mut dyn NativeCommand,
        lease: ConnectionLease,
    ) -> FacadeResult<()> {
        let closed = match lease.kind {
            LeaseKind::Private => lease.connection.close().map_err(|err| {
                FacadeError::connection("failed to close connection", err)
            }),
            LeaseKind::Transaction => Ok(()),
        };
        command.set_connection(None);
        debug!(kind = ?lease.kind, "Connection released");
        closed
    }

    fn open_connection(&self) -> FacadeResult<SharedConnection> {
        let driver = self.driver()?;
        let connection_string = self.connection_string()?;
        let connection = driver.open_connection(connection_string).map_err(|err| {
            FacadeError::connection(
                format!(
                    "cannot open connection '{}'",
                    self.inner.settings.display_name()
                ),
                err,
            )
        })?;
        Ok(Arc::from(connection))
    }

    fn connection_string(&self) -> FacadeResult<&str> {
        if let Some(cs) = self.inner.connection_string.get() {
            return Ok(cs.as_str());
        }
        let merged = self.inner.settings.effective_connection_string()?;
        Ok(self.inner.connection_string.get_or_init(|| merged).as_str())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &self.inner.settings)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}
