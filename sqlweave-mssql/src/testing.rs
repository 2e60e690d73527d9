//! In-memory driver doubles.
//!
//! [`RecordingDbapi`] hands out [`RecordingConnection`]s that log every
//! call instead of talking to a server. Clones of a connection share the
//! same log, so a test can keep a handle while the dialect owns the boxed
//! connection.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlweave_core::{
    ConnectArgs, DbapiConnection, DbapiProvider, DialectError, DialectResult, SqlValue,
};

use crate::minitds::MinitdsDialect;

/// A call made on a [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// `execute(sql)`
    Execute(String),
    /// `scalar(sql)`
    Scalar(String),
    /// `set_autocommit(enabled)`
    SetAutocommit(bool),
    /// `commit()`
    Commit,
    /// `rollback()`
    Rollback,
    /// `close()`
    Close,
}

/// Connection double that records calls and replays canned scalars.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnection {
    calls: Arc<Mutex<Vec<Call>>>,
    scalars: Arc<Mutex<VecDeque<SqlValue>>>,
    failure: Option<DialectError>,
}

impl RecordingConnection {
    /// Create a connection with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a value for the next `scalar` call. Unqueued calls return NULL.
    pub fn with_scalar(self, value: impl Into<SqlValue>) -> Self {
        self.scalars.lock().push_back(value.into());
        self
    }

    /// Make every call fail with the given error after it is recorded.
    pub fn failing(mut self, error: DialectError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) -> DialectResult<()> {
        self.calls.lock().push(call);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DbapiConnection for RecordingConnection {
    async fn execute(&mut self, sql: &str) -> DialectResult<u64> {
        self.record(Call::Execute(sql.to_string()))?;
        Ok(0)
    }

    async fn scalar(&mut self, sql: &str) -> DialectResult<SqlValue> {
        self.record(Call::Scalar(sql.to_string()))?;
        Ok(self.scalars.lock().pop_front().unwrap_or(SqlValue::Null))
    }

    async fn set_autocommit(&mut self, enabled: bool) -> DialectResult<()> {
        self.record(Call::SetAutocommit(enabled))
    }

    async fn commit(&mut self) -> DialectResult<()> {
        self.record(Call::Commit)
    }

    async fn rollback(&mut self) -> DialectResult<()> {
        self.record(Call::Rollback)
    }

    async fn close(&mut self) -> DialectResult<()> {
        self.record(Call::Close)
    }
}

/// Provider double returning clones of one [`RecordingConnection`].
#[derive(Debug, Clone, Default)]
pub struct RecordingDbapi {
    connection: RecordingConnection,
    connects: Arc<Mutex<Vec<ConnectArgs>>>,
    refusal: Option<DialectError>,
}

impl RecordingDbapi {
    /// Create a provider around a fresh connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out clones of the given connection.
    pub fn with_connection(mut self, connection: RecordingConnection) -> Self {
        self.connection = connection;
        self
    }

    /// Fail every connect attempt with the given error.
    pub fn refusing(mut self, error: DialectError) -> Self {
        self.refusal = Some(error);
        self
    }

    /// The connection handed out by `connect`.
    pub fn connection(&self) -> &RecordingConnection {
        &self.connection
    }

    /// Arguments of every connect attempt so far.
    pub fn connects(&self) -> Vec<ConnectArgs> {
        self.connects.lock().clone()
    }
}

#[async_trait]
impl DbapiProvider for RecordingDbapi {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&self, args: &ConnectArgs) -> DialectResult<Box<dyn DbapiConnection>> {
        self.connects.lock().push(args.clone());
        match &self.refusal {
            Some(err) => Err(err.clone()),
            None => Ok(Box::new(self.connection.clone())),
        }
    }
}

/// A minitds dialect over a fresh [`RecordingDbapi`].
pub fn dialect() -> MinitdsDialect {
    MinitdsDialect::new(Arc::new(RecordingDbapi::new()))
}
