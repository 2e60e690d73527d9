//! A minitds-compatible driver provider built on tiberius.
//!
//! [`TiberiusDbapi`] understands the connect options produced by
//! [`MinitdsDialect`](crate::minitds::MinitdsDialect):
//!
//! | option | meaning |
//! |---|---|
//! | `host` | `host`, `host:port`, `[v6]` or `[v6]:port` (default port 1433) |
//! | `user`, `password` | SQL Server authentication |
//! | `database` | initial catalog |
//! | `use_ssl` | `false` disables TLS, `true` requires it |
//! | `trust_cert` | accept any server certificate |
//! | `appname` | application name reported to the server |
//! | `login_timeout` | seconds allowed for the TCP connect and login |
//!
//! Other options are ignored.

use std::time::Duration;

use async_trait::async_trait;
use sqlweave_core::{
    ConnectArgs, ConnectOptions, DbapiConnection, DbapiProvider, DialectError, DialectResult,
    SqlValue,
};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::base::DEFAULT_PORT;
use crate::error::{MssqlError, MssqlResult};

type TdsClient = Client<Compat<TcpStream>>;

/// Application name sent when the options do not set one.
pub const DEFAULT_APPLICATION_NAME: &str = "sqlweave";

/// Login timeout used when the options do not set one.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Driver provider opening tiberius connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiberiusDbapi;

impl TiberiusDbapi {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DbapiProvider for TiberiusDbapi {
    fn name(&self) -> &str {
        "tiberius"
    }

    async fn connect(&self, args: &ConnectArgs) -> DialectResult<Box<dyn DbapiConnection>> {
        let conn = TiberiusConnection::connect(&args.options).await?;
        Ok(Box::new(conn))
    }
}

/// Split `host`, `host:port`, `[v6]` or `[v6]:port`.
///
/// A bare address holding more than one `:` is an unbracketed IPv6 host and
/// keeps the default port.
fn split_host(value: &str) -> MssqlResult<(&str, u16)> {
    let parse_port = |port: &str| {
        port.parse::<u16>()
            .map_err(|_| MssqlError::config(format!("invalid port in host option: {}", value)))
    };

    if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| MssqlError::config(format!("unclosed '[' in host option: {}", value)))?;
        return match tail {
            "" => Ok((host, DEFAULT_PORT)),
            _ => match tail.strip_prefix(':') {
                Some(port) => Ok((host, parse_port(port)?)),
                None => Err(MssqlError::config(format!(
                    "unexpected text after ']' in host option: {}",
                    value
                ))),
            },
        };
    }

    match value.split_once(':') {
        Some((host, port)) if !port.contains(':') => Ok((host, parse_port(port)?)),
        _ => Ok((value, DEFAULT_PORT)),
    }
}

/// Check if a statement changes session state.
///
/// tiberius runs `Client::execute` through `sp_executesql`, and SQL Server
/// reverts `SET` options made inside it when the call returns. These
/// statements go out as plain batches instead.
fn is_session_statement(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == ';')
        .next()
        .unwrap_or_default();
    ["SET", "USE"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

fn option_flag(options: &ConnectOptions, key: &str) -> MssqlResult<Option<bool>> {
    options
        .get(key)
        .map(|v| {
            v.as_bool()
                .ok_or_else(|| MssqlError::config(format!("option '{}' must be a boolean", key)))
        })
        .transpose()
}

/// Build a tiberius configuration from connect options.
pub fn tiberius_config(options: &ConnectOptions) -> MssqlResult<Config> {
    let mut config = Config::new();

    let host = options
        .get_str("host")
        .ok_or_else(|| MssqlError::config("missing 'host' option"))?;
    let (host, port) = split_host(host)?;
    config.host(host);
    config.port(port);

    if let Some(database) = options.get_str("database") {
        config.database(database);
    }

    config.application_name(options.get_str("appname").unwrap_or(DEFAULT_APPLICATION_NAME));

    match (options.get_str("user"), options.get_str("password")) {
        (Some(user), password) => {
            config.authentication(AuthMethod::sql_server(user, password.unwrap_or_default()));
        }
        (None, _) => {
            return Err(MssqlError::config("missing 'user' option"));
        }
    }

    let encryption = match option_flag(options, "use_ssl")? {
        Some(false) => EncryptionLevel::NotSupported,
        Some(true) => EncryptionLevel::Required,
        None => EncryptionLevel::On,
    };
    config.encryption(encryption);

    if option_flag(options, "trust_cert")?.unwrap_or(false) {
        config.trust_cert();
    }

    Ok(config)
}

fn login_timeout(options: &ConnectOptions) -> MssqlResult<Duration> {
    match options.get("login_timeout") {
        Some(value) => value
            .as_int()
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs)
            .ok_or_else(|| MssqlError::config("option 'login_timeout' must be a number of seconds")),
        None => Ok(DEFAULT_LOGIN_TIMEOUT),
    }
}

async fn open_client(config: Config) -> MssqlResult<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL redirects logins to the node that holds the database.
        Err(tiberius::error::Error::Routing { host, port }) => {
            info!(host = %host, port = port, "Following server redirect");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Convert a single column value.
pub fn column_value(data: &ColumnData<'static>) -> MssqlResult<SqlValue> {
    let value = match data {
        ColumnData::Bit(v) => v.map_or(SqlValue::Null, SqlValue::Bool),
        ColumnData::U8(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
        ColumnData::I16(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
        ColumnData::I32(v) => v.map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
        ColumnData::I64(v) => v.map_or(SqlValue::Null, SqlValue::Int),
        ColumnData::F32(v) => v.map_or(SqlValue::Null, |v| SqlValue::Float(f64::from(v))),
        ColumnData::F64(v) => v.map_or(SqlValue::Null, SqlValue::Float),
        ColumnData::Numeric(v) => match v {
            Some(n) => {
                let d = Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale()))
                    .map_err(|e| MssqlError::type_conversion(format!("numeric: {}", e)))?;
                SqlValue::Decimal(d)
            }
            None => SqlValue::Null,
        },
        ColumnData::String(v) => v
            .as_ref()
            .map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map_or(SqlValue::Null, |g| SqlValue::Text(g.to_string())),
        ColumnData::Binary(v) => v
            .as_ref()
            .map_or(SqlValue::Null, |b| SqlValue::Bytes(b.to_vec())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map_or(SqlValue::Null, |x| SqlValue::Text(x.to_string())),
        other => {
            return Err(MssqlError::type_conversion(format!(
                "unsupported column type {:?}",
                other
            )));
        }
    };
    Ok(value)
}

/// Convert the first column of a row. Date and time values become ISO text.
fn first_value(row: &Row) -> MssqlResult<SqlValue> {
    let Some((_, data)) = row.cells().next() else {
        return Ok(SqlValue::Null);
    };

    let text = match data {
        ColumnData::DateTime(Some(_))
        | ColumnData::SmallDateTime(Some(_))
        | ColumnData::DateTime2(Some(_)) => row
            .try_get::<chrono::NaiveDateTime, _>(0)?
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        ColumnData::DateTimeOffset(Some(_)) => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(0)?
            .map(|dt| dt.to_rfc3339()),
        ColumnData::Date(Some(_)) => row
            .try_get::<chrono::NaiveDate, _>(0)?
            .map(|d| d.format("%Y-%m-%d").to_string()),
        ColumnData::Time(Some(_)) => row
            .try_get::<chrono::NaiveTime, _>(0)?
            .map(|t| t.format("%H:%M:%S%.f").to_string()),
        ColumnData::DateTime(None)
        | ColumnData::SmallDateTime(None)
        | ColumnData::DateTime2(None)
        | ColumnData::DateTimeOffset(None)
        | ColumnData::Date(None)
        | ColumnData::Time(None) => return Ok(SqlValue::Null),
        other => return column_value(other),
    };
    Ok(text.map_or(SqlValue::Null, SqlValue::Text))
}

/// An open tiberius connection.
pub struct TiberiusConnection {
    client: Option<TdsClient>,
}

impl TiberiusConnection {
    /// Connect using minitds-style options.
    pub async fn connect(options: &ConnectOptions) -> DialectResult<Self> {
        let config = tiberius_config(options)?;
        let timeout = login_timeout(options)?;
        debug!(addr = %config.get_addr(), "Connecting to SQL Server");

        let client = tokio::time::timeout(timeout, open_client(config))
            .await
            .map_err(|_| {
                DialectError::driver(format!(
                    "Adaptive Server connection timed out after {}s",
                    timeout.as_secs()
                ))
            })??;

        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> MssqlResult<&mut TdsClient> {
        self.client
            .as_mut()
            .ok_or_else(|| MssqlError::connection("Connection is closed"))
    }

    async fn batch(&mut self, sql: &str) -> MssqlResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.client()?
            .simple_query(sql)
            .await?
            .into_results()
            .await?;
        Ok(())
    }

    async fn run(&mut self, sql: &str) -> MssqlResult<u64> {
        debug!(sql = %sql, "Executing statement");
        let result = self.client()?.execute(sql, &[]).await?;
        Ok(result.total())
    }

    async fn first(&mut self, sql: &str) -> MssqlResult<SqlValue> {
        debug!(sql = %sql, "Executing scalar query");
        let row = self.client()?.simple_query(sql).await?.into_row().await?;
        match row {
            Some(row) => first_value(&row),
            None => Ok(SqlValue::Null),
        }
    }
}

impl std::fmt::Debug for TiberiusConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiberiusConnection")
            .field("open", &self.client.is_some())
            .finish()
    }
}

#[async_trait]
impl DbapiConnection for TiberiusConnection {
    /// Session statements run as a batch and report no rows. Everything
    /// else goes through `sp_executesql` and reports the affected row count.
    async fn execute(&mut self, sql: &str) -> DialectResult<u64> {
        if is_session_statement(sql) {
            self.batch(sql).await?;
            return Ok(0);
        }
        Ok(self.run(sql).await?)
    }

    async fn scalar(&mut self, sql: &str) -> DialectResult<SqlValue> {
        Ok(self.first(sql).await?)
    }

    async fn set_autocommit(&mut self, enabled: bool) -> DialectResult<()> {
        // SQL Server sessions autocommit unless implicit transactions are on.
        let sql = if enabled {
            "SET IMPLICIT_TRANSACTIONS OFF"
        } else {
            "SET IMPLICIT_TRANSACTIONS ON"
        };
        Ok(self.batch(sql).await?)
    }

    async fn commit(&mut self) -> DialectResult<()> {
        Ok(self.batch("IF @@TRANCOUNT > 0 COMMIT TRANSACTION").await?)
    }

    async fn rollback(&mut self) -> DialectResult<()> {
        Ok(self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await?)
    }

    async fn close(&mut self) -> DialectResult<()> {
        if let Some(client) = self.client.take() {
            debug!("Closing connection");
            client.close().await.map_err(MssqlError::from)?;
        }
        Ok(())
    }
}
