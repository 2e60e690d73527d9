//! The dialect interface.
//!
//! [`Dialect`] describes one backend/driver pairing. Its provided methods are
//! the generic behavior; a dialect overrides only what its driver does
//! differently.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::dbapi::{DbapiConnection, DbapiProvider};
use crate::error::{DialectError, DialectResult};
use crate::isolation::IsolationLevel;
use crate::options::ConnectArgs;
use crate::preparer::IdentifierPreparer;
use crate::types::{BindProcessor, ColSpecs, ResultProcessor, SqlType};
use crate::url::DatabaseUrl;
use crate::version::ServerVersion;

/// How a driver expects bound parameters to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Paramstyle {
    /// `?`
    Qmark,
    /// `:1`
    Numeric,
    /// `:name`
    Named,
    /// `%s`
    Format,
    /// `%(name)s`
    Pyformat,
}

impl Paramstyle {
    /// Get the conventional name of this paramstyle.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qmark => "qmark",
            Self::Numeric => "numeric",
            Self::Named => "named",
            Self::Format => "format",
            Self::Pyformat => "pyformat",
        }
    }

    /// Check if placeholders are introduced by a percent sign.
    pub fn uses_percent(&self) -> bool {
        matches!(self, Self::Format | Self::Pyformat)
    }

    /// Render the placeholder for a parameter.
    pub fn placeholder(&self, name: &str, position: usize) -> String {
        match self {
            Self::Qmark => "?".to_string(),
            Self::Numeric => format!(":{}", position),
            Self::Named => format!(":{}", name),
            Self::Format => "%s".to_string(),
            Self::Pyformat => format!("%({})s", name),
        }
    }
}

impl fmt::Display for Paramstyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL levels every dialect accepts by default.
const STANDARD_ISOLATION_LEVELS: &[IsolationLevel] = &[
    IsolationLevel::ReadUncommitted,
    IsolationLevel::ReadCommitted,
    IsolationLevel::RepeatableRead,
    IsolationLevel::Serializable,
];

/// One backend/driver pairing.
#[async_trait]
pub trait Dialect: Send + Sync {
    /// Backend name, e.g. `mssql`.
    fn name(&self) -> &str;

    /// Driver name, e.g. `minitds`.
    fn driver(&self) -> &str;

    /// Parameter style of the driver.
    fn paramstyle(&self) -> Paramstyle;

    /// Whether the driver returns exact decimals natively.
    fn supports_native_decimal(&self) -> bool {
        false
    }

    /// Identifier preparer for generated SQL.
    fn identifier_preparer(&self) -> &IdentifierPreparer;

    /// Type implementation table.
    fn colspecs(&self) -> &'static ColSpecs;

    /// The driver this dialect talks to.
    fn dbapi(&self) -> Arc<dyn DbapiProvider>;

    /// Isolation levels accepted by [`Dialect::set_isolation_level`].
    fn isolation_levels(&self) -> &[IsolationLevel] {
        STANDARD_ISOLATION_LEVELS
    }

    /// Result processor for a column of the given type.
    fn result_processor(&self, ty: &SqlType) -> Option<ResultProcessor>
    where
        Self: Sized,
    {
        self.colspecs().adapt(ty).result_processor(self)
    }

    /// Bind processor for a parameter of the given type.
    fn bind_processor(&self, ty: &SqlType) -> Option<BindProcessor>
    where
        Self: Sized,
    {
        self.colspecs().adapt(ty).bind_processor(self)
    }

    /// Build driver connect arguments from a URL.
    ///
    /// The generic form passes the standard URL fields through under their
    /// own names and merges the query string on top.
    fn create_connect_args(&self, url: &DatabaseUrl) -> ConnectArgs {
        let mut options = url.translate_connect_args(&[]);
        options.extend(url.query().iter().map(|(k, v)| (k.clone(), v.clone())));
        ConnectArgs::from_options(options)
    }

    /// Decide whether a driver error means the connection is gone.
    fn is_disconnect(&self, _error: &dyn fmt::Display) -> bool {
        false
    }

    /// Check that a level is one this dialect accepts.
    fn validate_isolation_level(&self, level: IsolationLevel) -> DialectResult<()> {
        let accepted = self.isolation_levels();
        if accepted.contains(&level) {
            Ok(())
        } else {
            Err(DialectError::InvalidIsolationLevel {
                level: level.as_sql().to_string(),
                valid: IsolationLevel::names(accepted),
            })
        }
    }

    /// Read the server version from a live connection.
    async fn server_version_info(
        &self,
        _conn: &mut dyn DbapiConnection,
    ) -> DialectResult<Option<ServerVersion>> {
        Ok(None)
    }

    /// Apply an isolation level to a live connection.
    async fn set_isolation_level(
        &self,
        conn: &mut dyn DbapiConnection,
        level: IsolationLevel,
    ) -> DialectResult<()> {
        self.validate_isolation_level(level)?;
        debug!(dialect = %self.name(), level = %level, "Setting isolation level");
        conn.execute(&format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()))
            .await?;
        Ok(())
    }

    /// Read the isolation level of a live connection.
    async fn get_isolation_level(
        &self,
        _conn: &mut dyn DbapiConnection,
    ) -> DialectResult<IsolationLevel> {
        Err(DialectError::config(format!(
            "{}+{} cannot report the isolation level",
            self.name(),
            self.driver()
        )))
    }

    /// Return a connection to the default isolation level.
    async fn reset_isolation_level(&self, conn: &mut dyn DbapiConnection) -> DialectResult<()> {
        self.set_isolation_level(conn, IsolationLevel::default())
            .await
    }
}
