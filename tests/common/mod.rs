//! Common utilities for integration tests.
//!
//! `RecordingDriver` is an in-memory driver that writes every native call into a
//! shared `Journal`, and reads its behaviour from a `Script` the test adjusts.
//! Connections are identified by their address inside the manager's `Arc`, so
//! the same id shows up for `Began`, `Executed` and `Closed` on one connection.

#![allow(dead_code)]

use db_facade::db::{
    BulkAdapter, CancelHandle, CommandKind, DriverCapability, NativeCommand, NativeConnection,
    NativeParameter, NativeTransaction, SharedConnection,
};
use db_facade::{
    ConnectionManager, ConnectionSettings, DbType, DriverError, ParameterDirection,
    ProviderRegistry, RowSet, Value,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub const PROVIDER: &str = "fake";

/// Snapshot of one native parameter at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeParam {
    pub name: String,
    pub value: Value,
    pub db_type: DbType,
    pub direction: ParameterDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub connection: usize,
    pub text: String,
    pub kind: CommandKind,
    pub timeout_secs: u32,
    pub params: Vec<NativeParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Opened { connection_string: String },
    Closed(usize),
    Began(usize),
    Committed(usize),
    RolledBack(usize),
    Executed(Execution),
    Cancelled,
    CommandReleased,
}

/// What the driver does when called.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub fail_open: Option<String>,
    pub fail_begin: Option<String>,
    pub fail_commit: Option<String>,
    pub fail_close: Option<String>,
    pub fail_execute: Option<String>,
    /// Values the driver writes into native parameters with these names,
    /// whatever their direction.
    pub outputs: HashMap<String, Value>,
    pub rows_affected: u64,
    pub scalar: Option<Value>,
    pub rowsets: Vec<RowSet>,
    /// Execution blocks until the command is cancelled.
    pub block_until_cancelled: bool,
}

#[derive(Default)]
struct JournalState {
    events: Vec<Event>,
    script: Script,
}

#[derive(Clone, Default)]
pub struct Journal {
    state: Arc<Mutex<JournalState>>,
}

impl Journal {
    pub fn record(&self, event: Event) {
        self.state.lock().events.push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn clear(&self) {
        self.state.lock().events.clear();
    }

    pub fn script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.state.lock().script);
    }

    fn current_script(&self) -> Script {
        self.state.lock().script.clone()
    }

    pub fn opened(&self) -> usize {
        self.count(|e| matches!(e, Event::Opened { .. }))
    }

    pub fn closed(&self) -> Vec<usize> {
        self.filter_map(|e| match e {
            Event::Closed(id) => Some(*id),
            _ => None,
        })
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.filter_map(|e| match e {
            Event::Executed(execution) => Some(execution.clone()),
            _ => None,
        })
    }

    pub fn last_execution(&self) -> Option<Execution> {
        self.executions().pop()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| pred(e)).count()
    }

    fn filter_map<T>(&self, f: impl Fn(&Event) -> Option<T>) -> Vec<T> {
        self.state.lock().events.iter().filter_map(f).collect()
    }

    /// Poll until `pred` holds or the deadline passes.
    pub fn wait_for(&self, pred: impl Fn(&Journal) -> bool) -> bool {
        for _ in 0..200 {
            if pred(self) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        pred(self)
    }
}

fn address_of<T: ?Sized>(value: &T) -> usize {
    value as *const T as *const () as usize
}

fn connection_id(connection: &SharedConnection) -> usize {
    Arc::as_ptr(connection) as *const () as usize
}

// =============================================================================
// Native handles
// =============================================================================

pub struct RecordingDriver {
    journal: Journal,
}

impl RecordingDriver {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl DriverCapability for RecordingDriver {
    fn open_connection(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn NativeConnection>, DriverError> {
        if let Some(message) = self.journal.current_script().fail_open {
            return Err(DriverError::new(message).with_code("08001"));
        }
        self.journal.record(Event::Opened {
            connection_string: connection_string.to_string(),
        });
        Ok(Box::new(FakeConnection {
            journal: self.journal.clone(),
        }))
    }

    fn create_command(&self) -> Result<Box<dyn NativeCommand>, DriverError> {
        Ok(Box::new(FakeCommand {
            journal: self.journal.clone(),
            text: String::new(),
            kind: CommandKind::Text,
            timeout_secs: 30,
            params: Vec::new(),
            connection: None,
            cancel: Arc::new(FakeCancel {
                journal: self.journal.clone(),
                cancelled: AtomicBool::new(false),
            }),
        }))
    }

    fn create_parameter(&self) -> Box<dyn NativeParameter> {
        Box::new(FakeParameter::default())
    }

    fn create_bulk_adapter(&self) -> Result<Box<dyn BulkAdapter>, DriverError> {
        Ok(Box::new(FakeAdapter {
            journal: self.journal.clone(),
        }))
    }
}

struct FakeConnection {
    journal: Journal,
}

impl NativeConnection for FakeConnection {
    fn begin_transaction(&self) -> Result<Box<dyn NativeTransaction>, DriverError> {
        if let Some(message) = self.journal.current_script().fail_begin {
            return Err(DriverError::new(message));
        }
        let connection = address_of(self);
        self.journal.record(Event::Began(connection));
        Ok(Box::new(FakeTransaction {
            journal: self.journal.clone(),
            connection,
        }))
    }

    fn close(&self) -> Result<(), DriverError> {
        if let Some(message) = self.journal.current_script().fail_close {
            return Err(DriverError::new(message));
        }
        self.journal.record(Event::Closed(address_of(self)));
        Ok(())
    }
}

struct FakeTransaction {
    journal: Journal,
    connection: usize,
}

impl NativeTransaction for FakeTransaction {
    fn commit(self: Box<Self>) -> Result<(), DriverError> {
        if let Some(message) = self.journal.current_script().fail_commit {
            return Err(DriverError::new(message));
        }
        self.journal.record(Event::Committed(self.connection));
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.journal.record(Event::RolledBack(self.connection));
        Ok(())
    }
}

#[derive(Default)]
struct FakeParameter {
    name: String,
    value: Value,
    db_type: DbType,
    direction: ParameterDirection,
}

impl NativeParameter for FakeParameter {
    fn name(&self) -> &str {
        &self.name
    }
    fn set_name(&mut self, name: String) {
        self.name = name;
    }
    fn value(&self) -> &Value {
        &self.value
    }
    fn set_value(&mut self, value: Value) {
        self.value = value;
    }
    fn db_type(&self) -> DbType {
        self.db_type
    }
    fn set_db_type(&mut self, db_type: DbType) {
        self.db_type = db_type;
    }
    fn direction(&self) -> ParameterDirection {
        self.direction
    }
    fn set_direction(&mut self, direction: ParameterDirection) {
        self.direction = direction;
    }
}

struct FakeCancel {
    journal: Journal,
    cancelled: AtomicBool,
}

impl CancelHandle for FakeCancel {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.journal.record(Event::Cancelled);
    }
}

struct FakeCommand {
    journal: Journal,
    text: String,
    kind: CommandKind,
    timeout_secs: u32,
    params: Vec<Box<dyn NativeParameter>>,
    connection: Option<SharedConnection>,
    cancel: Arc<FakeCancel>,
}

impl FakeCommand {
    /// Record the execution, then apply the script.
    fn run(&mut self) -> Result<Script, DriverError> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| DriverError::new("command has no connection"))?;

        self.journal.record(Event::Executed(Execution {
            connection: connection_id(connection),
            text: self.text.clone(),
            kind: self.kind,
            timeout_secs: self.timeout_secs,
            params: self
                .params
                .iter()
                .map(|p| NativeParam {
                    name: p.name().to_string(),
                    value: p.value().clone(),
                    db_type: p.db_type(),
                    direction: p.direction(),
                })
                .collect(),
        }));

        let script = self.journal.current_script();
        if script.block_until_cancelled {
            let mut cancelled = false;
            for _ in 0..400 {
                if self.cancel.cancelled.load(Ordering::SeqCst) {
                    cancelled = true;
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            let message = if cancelled { "operation cancelled" } else { "timed out" };
            return Err(DriverError::new(message));
        }
        if let Some(message) = &script.fail_execute {
            return Err(DriverError::new(message.clone()).with_code("42000"));
        }
        for param in &mut self.params {
            if let Some(value) = script.outputs.get(param.name()) {
                param.set_value(value.clone());
            }
        }
        Ok(script)
    }
}

impl NativeCommand for FakeCommand {
    fn command_text(&self) -> &str {
        &self.text
    }
    fn set_command_text(&mut self, text: &str) {
        self.text = text.to_string();
    }
    fn command_kind(&self) -> CommandKind {
        self.kind
    }
    fn set_command_kind(&mut self, kind: CommandKind) {
        self.kind = kind;
    }
    fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }
    fn set_timeout_secs(&mut self, secs: u32) {
        self.timeout_secs = secs;
    }
    fn parameters(&self) -> &[Box<dyn NativeParameter>] {
        &self.params
    }
    fn clear_parameters(&mut self) {
        self.params.clear();
    }
    fn add_parameter(&mut self, parameter: Box<dyn NativeParameter>) {
        self.params.push(parameter);
    }
    fn connection(&self) -> Option<&SharedConnection> {
        self.connection.as_ref()
    }
    fn set_connection(&mut self, connection: Option<SharedConnection>) {
        self.connection = connection;
    }

    fn execute_non_query(&mut self) -> Result<u64, DriverError> {
        Ok(self.run()?.rows_affected)
    }

    fn execute_scalar(&mut self) -> Result<Option<Value>, DriverError> {
        Ok(self.run()?.scalar)
    }

    fn cancel_handle(&self) -> Option<Arc<dyn CancelHandle>> {
        Some(self.cancel.clone())
    }
}

impl Drop for FakeCommand {
    fn drop(&mut self) {
        self.journal.record(Event::CommandReleased);
    }
}

struct FakeAdapter {
    journal: Journal,
}

impl BulkAdapter for FakeAdapter {
    fn fill(&mut self, command: &mut dyn NativeCommand) -> Result<Vec<RowSet>, DriverError> {
        let connection = command
            .connection()
            .ok_or_else(|| DriverError::new("command has no connection"))?;
        self.journal.record(Event::Executed(Execution {
            connection: connection_id(connection),
            text: command.command_text().to_string(),
            kind: command.command_kind(),
            timeout_secs: command.timeout_secs(),
            params: command
                .parameters()
                .iter()
                .map(|p| NativeParam {
                    name: p.name().to_string(),
                    value: p.value().clone(),
                    db_type: p.db_type(),
                    direction: p.direction(),
                })
                .collect(),
        }));
        let script = self.journal.current_script();
        if let Some(message) = script.fail_execute {
            return Err(DriverError::new(message));
        }
        Ok(script.rowsets)
    }
}

// =============================================================================
// Setup helpers
// =============================================================================

/// Initialize tracing for tests. Controlled by RUST_LOG; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A private registry with the recording driver registered as `fake`.
pub fn registry() -> (ProviderRegistry, Journal) {
    let journal = Journal::default();
    let registry = ProviderRegistry::new();
    registry
        .register(PROVIDER, Arc::new(RecordingDriver::new(journal.clone())))
        .expect("register fake provider");
    (registry, journal)
}

pub fn manager_with(settings: ConnectionSettings) -> (ConnectionManager, Journal) {
    init_tracing();
    let (registry, journal) = registry();
    let manager = ConnectionManager::with_registry(registry, settings.with_provider(PROVIDER))
        .expect("create manager");
    (manager, journal)
}

pub fn manager() -> (ConnectionManager, Journal) {
    manager_with(ConnectionSettings::new("Server=fake;Database=test"))
}
