//! Driver seams.
//!
//! A dialect never resolves its driver by name. The application hands it a
//! [`DbapiProvider`], and every connection the provider opens is used through
//! [`DbapiConnection`].

use async_trait::async_trait;

use crate::error::DialectResult;
use crate::options::ConnectArgs;
use crate::types::SqlValue;

/// An open driver connection.
#[async_trait]
pub trait DbapiConnection: Send {
    /// Execute a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str) -> DialectResult<u64>;

    /// Execute a query and return the first column of the first row, or NULL.
    async fn scalar(&mut self, sql: &str) -> DialectResult<SqlValue>;

    /// Turn driver-level autocommit on or off.
    async fn set_autocommit(&mut self, enabled: bool) -> DialectResult<()>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> DialectResult<()>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> DialectResult<()>;

    /// Close the connection.
    async fn close(&mut self) -> DialectResult<()>;
}

/// A driver that can open connections.
#[async_trait]
pub trait DbapiProvider: Send + Sync {
    /// Driver name, for logging.
    fn name(&self) -> &str;

    /// Wrap a value as a driver binary parameter.
    fn binary(&self, value: SqlValue) -> SqlValue {
        value
    }

    /// Open a connection with the given arguments.
    async fn connect(&self, args: &ConnectArgs) -> DialectResult<Box<dyn DbapiConnection>>;
}
