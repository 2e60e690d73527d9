//! The `mssql+minitds` dialect.
//!
//! minitds is a small TDS client. Compared to the SQL Server base policy it
//! differs in a handful of places:
//!
//! - NUMERIC columns declared with `asdecimal = false` come back as floats,
//!   and FLOAT columns keep the base float behavior
//! - the paramstyle is `pyformat`, yet literal `%` signs must not be doubled
//! - connect options use `user` instead of `username`, take the port as part
//!   of `host`, and always carry `use_ssl = false`
//! - lost connections are recognized by known fragments of the error text
//! - autocommit is a driver switch, not an isolation level the server knows
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use sqlweave_core::{DatabaseUrl, Dialect};
//! use sqlweave_mssql::{MinitdsDialect, TiberiusDbapi};
//!
//! let dialect = MinitdsDialect::new(Arc::new(TiberiusDbapi::new()));
//! let url = DatabaseUrl::parse("mssql+minitds://sa:pw@db.local:1444/app").unwrap();
//! let args = dialect.create_connect_args(&url);
//!
//! assert!(args.args.is_empty());
//! assert_eq!(args.options.get_str("host"), Some("db.local:1444"));
//! assert_eq!(args.options.get_str("user"), Some("sa"));
//! assert!(!args.options.contains_key("port"));
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlweave_core::types::{FloatType, NumericType, ResultProcessor, TypeImpl, processors};
use sqlweave_core::{
    ColSpecs, ConnectArgs, DatabaseUrl, DbapiConnection, DbapiProvider, Dialect, DialectError,
    DialectResult, IdentifierPreparer, IsolationLevel, OptionValue, Paramstyle, ServerVersion,
    SqlType, SqlValue, TypeClass,
};
use tracing::{debug, info, warn};

use crate::base;
use crate::config::{BACKEND, DRIVER, MinitdsConfig};
use crate::version::{MssqlCapabilities, VERSION_QUERY, parse_version_banner};

/// Error text fragments that mean the connection is gone.
///
/// The list tracks the messages minitds and FreeTDS are known to produce.
/// An unlisted message is treated as an ordinary error.
pub const DISCONNECT_MESSAGES: &[&str] = &[
    "Adaptive Server connection timed out",
    "Net-Lib error during Connection reset by peer",
    // connection timeout
    "message 20003",
    "Error 10054",
    "Not connected to any MS SQL server",
    "Connection is closed",
    // write to the server failed
    "message 20006",
    // unexpected EOF from the server
    "message 20017",
];

/// Levels accepted by [`MinitdsDialect::set_isolation_level`].
pub const ISOLATION_LEVELS: &[IsolationLevel] = &[
    IsolationLevel::Autocommit,
    IsolationLevel::ReadUncommitted,
    IsolationLevel::ReadCommitted,
    IsolationLevel::RepeatableRead,
    IsolationLevel::Serializable,
    IsolationLevel::Snapshot,
];

/// Type table: the SQL Server table with the NUMERIC override, and FLOAT
/// pinned to the base float type so it does not resolve to the override.
pub static COLSPECS: ColSpecs = ColSpecs::extending(
    &base::COLSPECS,
    &[
        (TypeClass::Numeric, MinitdsNumeric::adapt),
        (TypeClass::Float, FloatType::adapt),
    ],
);

/// Check an error message against [`DISCONNECT_MESSAGES`].
pub fn is_disconnect_message(message: &str) -> bool {
    DISCONNECT_MESSAGES.iter().any(|m| message.contains(m))
}

/// NUMERIC as read through minitds.
///
/// minitds returns exact decimals natively, so with `asdecimal = false`
/// values are coerced to `f64`; otherwise the base NUMERIC processor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinitdsNumeric {
    /// Return exact decimals.
    pub asdecimal: bool,
    /// Scale to quantize decimals to.
    pub scale: Option<u32>,
}

impl MinitdsNumeric {
    /// Adapter for [`ColSpecs`] tables.
    pub fn adapt(ty: &SqlType) -> Box<dyn TypeImpl> {
        match *ty {
            SqlType::Numeric {
                scale, asdecimal, ..
            } => Box::new(Self { asdecimal, scale }),
            other => NumericType::adapt(&other),
        }
    }
}

impl TypeImpl for MinitdsNumeric {
    fn result_processor(&self, dialect: &dyn Dialect) -> Option<ResultProcessor> {
        if !self.asdecimal {
            return Some(Arc::new(processors::to_float));
        }
        NumericType {
            asdecimal: self.asdecimal,
            scale: self.scale,
        }
        .result_processor(dialect)
    }
}

/// Wraps the injected provider so binary parameters are byte values or text.
pub struct PatchedDbapi {
    inner: Arc<dyn DbapiProvider>,
}

impl PatchedDbapi {
    /// Wrap a provider.
    pub fn new(inner: Arc<dyn DbapiProvider>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for PatchedDbapi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchedDbapi")
            .field("inner", &self.inner.name())
            .finish()
    }
}

#[async_trait]
impl DbapiProvider for PatchedDbapi {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn binary(&self, value: SqlValue) -> SqlValue {
        match value {
            SqlValue::Bytes(_) => value,
            other => SqlValue::Text(other.to_string()),
        }
    }

    async fn connect(&self, args: &ConnectArgs) -> DialectResult<Box<dyn DbapiConnection>> {
        self.inner.connect(args).await
    }
}

/// A connection opened through [`MinitdsDialect::connect`].
pub struct DialectConnection {
    conn: Box<dyn DbapiConnection>,
    capabilities: MssqlCapabilities,
}

impl DialectConnection {
    /// Server version read when the connection opened.
    pub fn server_version(&self) -> Option<ServerVersion> {
        self.capabilities.version()
    }

    /// Features of the connected server.
    pub fn capabilities(&self) -> &MssqlCapabilities {
        &self.capabilities
    }

    /// The driver connection.
    pub fn dbapi_connection(&mut self) -> &mut dyn DbapiConnection {
        self.conn.as_mut()
    }

    /// Give up the wrapper and keep the driver connection.
    pub fn into_inner(self) -> Box<dyn DbapiConnection> {
        self.conn
    }
}

impl fmt::Debug for DialectConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectConnection")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// SQL Server through minitds.
#[derive(Debug)]
pub struct MinitdsDialect {
    dbapi: Arc<PatchedDbapi>,
    preparer: IdentifierPreparer,
    isolation_level: Option<IsolationLevel>,
    detect_version: bool,
}

impl MinitdsDialect {
    /// Create the dialect over a driver provider.
    pub fn new(provider: Arc<dyn DbapiProvider>) -> Self {
        Self {
            dbapi: Arc::new(PatchedDbapi::new(provider)),
            preparer: base::identifier_preparer(Paramstyle::Pyformat).with_double_percents(false),
            isolation_level: None,
            detect_version: true,
        }
    }

    /// Create the dialect with the connection defaults of a configuration.
    pub fn from_config(config: &MinitdsConfig, provider: Arc<dyn DbapiProvider>) -> Self {
        let mut dialect = Self::new(provider);
        dialect.isolation_level = config.isolation_level();
        dialect.detect_version = config.detect_version();
        dialect
    }

    /// Set the isolation level applied to new connections.
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Turn server version detection on or off.
    pub fn with_version_detection(mut self, enabled: bool) -> Self {
        self.detect_version = enabled;
        self
    }

    /// Turn a driver error that reports a lost connection into
    /// [`DialectError::Disconnected`]. Other errors are returned as they are.
    pub fn classify_error(&self, err: DialectError) -> DialectError {
        match err {
            DialectError::Driver(msg) if self.is_disconnect(&msg) => {
                warn!(error = %msg, "Driver reported a lost connection");
                DialectError::Disconnected(msg)
            }
            other => other,
        }
    }

    /// Open a connection, read the server version and apply the default
    /// isolation level.
    pub async fn connect(&self, url: &DatabaseUrl) -> DialectResult<DialectConnection> {
        let args = self.create_connect_args(url);
        info!(driver = %self.dbapi.name(), url = %url, "Opening connection");

        let mut conn = self
            .dbapi
            .connect(&args)
            .await
            .map_err(|e| self.classify_error(e))?;

        let version = if self.detect_version {
            self.server_version_info(conn.as_mut()).await?
        } else {
            None
        };

        if let Some(level) = self.isolation_level {
            self.set_isolation_level(conn.as_mut(), level).await?;
        }

        Ok(DialectConnection {
            conn,
            capabilities: MssqlCapabilities::from_version(version),
        })
    }
}

fn port_is_set(port: &OptionValue) -> bool {
    match port {
        OptionValue::Int(i) => *i != 0,
        OptionValue::Str(s) => !s.is_empty(),
        OptionValue::Bool(b) => *b,
    }
}

#[async_trait]
impl Dialect for MinitdsDialect {
    fn name(&self) -> &str {
        BACKEND
    }

    fn driver(&self) -> &str {
        DRIVER
    }

    fn paramstyle(&self) -> Paramstyle {
        Paramstyle::Pyformat
    }

    fn supports_native_decimal(&self) -> bool {
        true
    }

    fn identifier_preparer(&self) -> &IdentifierPreparer {
        &self.preparer
    }

    fn colspecs(&self) -> &'static ColSpecs {
        &COLSPECS
    }

    fn dbapi(&self) -> Arc<dyn DbapiProvider> {
        self.dbapi.clone()
    }

    fn isolation_levels(&self) -> &[IsolationLevel] {
        ISOLATION_LEVELS
    }

    fn create_connect_args(&self, url: &DatabaseUrl) -> ConnectArgs {
        let mut opts = url.translate_connect_args(&[("username", "user")]);
        opts.extend(url.query().iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(port) = opts.remove("port").filter(port_is_set) {
            if let Some(host) = opts.get_str("host").map(str::to_owned) {
                opts.insert("host", format!("{}:{}", host, port));
            }
        }
        opts.insert("use_ssl", false);

        debug!(options = %opts.redacted_json(), "minitds connect args");
        ConnectArgs::from_options(opts)
    }

    fn is_disconnect(&self, error: &dyn fmt::Display) -> bool {
        is_disconnect_message(&error.to_string())
    }

    async fn server_version_info(
        &self,
        conn: &mut dyn DbapiConnection,
    ) -> DialectResult<Option<ServerVersion>> {
        let banner = conn
            .scalar(VERSION_QUERY)
            .await
            .map_err(|e| self.classify_error(e))?;

        let Some(text) = banner.as_text() else {
            warn!(kind = banner.kind(), "@@version did not return text");
            return Ok(None);
        };

        let version = parse_version_banner(text);
        match version {
            Some(v) => debug!(version = %v, "Detected server version"),
            None => warn!(banner = %text, "Unrecognized server version banner"),
        }
        Ok(version)
    }

    async fn set_isolation_level(
        &self,
        conn: &mut dyn DbapiConnection,
        level: IsolationLevel,
    ) -> DialectResult<()> {
        self.validate_isolation_level(level)?;

        if level.is_autocommit() {
            debug!("Enabling autocommit");
            return conn
                .set_autocommit(true)
                .await
                .map_err(|e| self.classify_error(e));
        }

        conn.set_autocommit(false)
            .await
            .map_err(|e| self.classify_error(e))?;
        base::set_isolation_level(conn, level)
            .await
            .map_err(|e| self.classify_error(e))
    }

    async fn get_isolation_level(
        &self,
        conn: &mut dyn DbapiConnection,
    ) -> DialectResult<IsolationLevel> {
        base::get_isolation_level(conn)
            .await
            .map_err(|e| self.classify_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingConnection, RecordingDbapi, dialect};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn url(s: &str) -> DatabaseUrl {
        DatabaseUrl::parse(s).unwrap()
    }

    #[test]
    fn test_identity() {
        let d = dialect();
        assert_eq!(d.name(), "mssql");
        assert_eq!(d.driver(), "minitds");
        assert_eq!(d.paramstyle(), Paramstyle::Pyformat);
        assert!(d.supports_native_decimal());
    }

    // Connect arguments

    #[test]
    fn test_connect_args_merges_port_into_host() {
        let args = dialect().create_connect_args(&url("mssql+minitds://sa:pw@db.local:1444/app"));

        assert!(args.args.is_empty());
        assert_eq!(args.options.get_str("host"), Some("db.local:1444"));
        assert!(!args.options.contains_key("port"));
        assert_eq!(args.options.get_str("user"), Some("sa"));
        assert!(!args.options.contains_key("username"));
        assert_eq!(args.options.get_str("password"), Some("pw"));
        assert_eq!(args.options.get_str("database"), Some("app"));
        assert_eq!(args.options.get("use_ssl"), Some(&OptionValue::Bool(false)));
    }

    #[test]
    fn test_connect_args_without_port() {
        let args = dialect().create_connect_args(&url("mssql+minitds://sa:pw@db.local/app"));
        assert_eq!(args.options.get_str("host"), Some("db.local"));
        assert!(!args.options.contains_key("port"));
    }

    #[test]
    fn test_connect_args_port_without_host_is_dropped() {
        let u = DatabaseUrl::new("mssql+minitds").with_port(1444).with_database("app");
        let args = dialect().create_connect_args(&u);
        assert!(!args.options.contains_key("port"));
        assert!(!args.options.contains_key("host"));
        assert_eq!(args.options.get_str("database"), Some("app"));
    }

    #[test]
    fn test_connect_args_query_wins_and_port_from_query() {
        let args = dialect().create_connect_args(&url(
            "mssql+minitds://sa:pw@db.local/app?user=other&charset=utf8&port=2000",
        ));
        assert_eq!(args.options.get_str("user"), Some("other"));
        assert_eq!(args.options.get_str("charset"), Some("utf8"));
        assert_eq!(args.options.get_str("host"), Some("db.local:2000"));
        assert!(!args.options.contains_key("port"));
    }

    #[test]
    fn test_connect_args_use_ssl_always_false() {
        let args = dialect()
            .create_connect_args(&url("mssql+minitds://h/db?use_ssl=true"));
        assert_eq!(args.options.get("use_ssl"), Some(&OptionValue::Bool(false)));

        let args = dialect().create_connect_args(&DatabaseUrl::new("mssql+minitds"));
        assert_eq!(args.options.keys().collect::<Vec<_>>(), vec!["use_ssl"]);
    }

    // Numeric conversion

    #[test]
    fn test_numeric_as_float() {
        let d = dialect();
        let ty = SqlType::numeric().with_asdecimal(false);
        let p = d.result_processor(&ty).unwrap();
        assert_eq!(p(SqlValue::from("3.14")).unwrap(), SqlValue::Float(3.14));
        assert_eq!(
            p(SqlValue::Decimal(Decimal::new(314, 2))).unwrap(),
            SqlValue::Float(3.14)
        );
        assert_eq!(p(SqlValue::Null).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_numeric_as_decimal() {
        let d = dialect();
        let p = d.result_processor(&SqlType::numeric()).unwrap();
        assert_eq!(
            p(SqlValue::from("3.14")).unwrap(),
            SqlValue::Decimal(Decimal::new(314, 2))
        );

        let p = d.result_processor(&SqlType::numeric().with_scale(3)).unwrap();
        let SqlValue::Decimal(v) = p(SqlValue::from("3.14")).unwrap() else {
            panic!("expected a decimal");
        };
        assert_eq!(v.scale(), 3);
        assert_eq!(v, Decimal::new(314, 2));
    }

    #[test]
    fn test_float_keeps_base_behavior() {
        let d = dialect();
        assert!(d.result_processor(&SqlType::float()).is_none());

        let ty = SqlType::float().with_asdecimal(true).with_scale(2);
        let p = d.result_processor(&ty).unwrap();
        assert_eq!(
            p(SqlValue::Float(1.5)).unwrap(),
            SqlValue::Decimal(Decimal::new(150, 2))
        );
    }

    #[test]
    fn test_other_types_pass_through() {
        let d = dialect();
        assert!(d.result_processor(&SqlType::Integer).is_none());
        assert!(d.result_processor(&SqlType::String { length: None }).is_none());
    }

    #[test]
    fn test_binary_bind_uses_patched_dbapi() {
        let d = dialect();
        let p = d.bind_processor(&SqlType::Binary { length: None }).unwrap();
        assert_eq!(p(SqlValue::Bytes(vec![1, 2])).unwrap(), SqlValue::Bytes(vec![1, 2]));
        assert_eq!(p(SqlValue::Int(42)).unwrap(), SqlValue::from("42"));
        assert_eq!(p(SqlValue::Null).unwrap(), SqlValue::Null);
    }

    // Preparer

    #[test]
    fn test_preparer_keeps_percent_signs() {
        let d = dialect();
        let p = d.identifier_preparer();
        assert!(!p.double_percents());
        assert_eq!(p.quote_identifier("100% done"), "[100% done]");
        assert_eq!(p.escape_literal_percents("LIKE 'a%'"), "LIKE 'a%'");

        let doubled = base::identifier_preparer(Paramstyle::Pyformat);
        assert_eq!(doubled.quote_identifier("100% done"), "[100%% done]");
    }

    // Disconnects

    #[test]
    fn test_is_disconnect() {
        let d = dialect();
        assert!(d.is_disconnect(&"DB-Lib error message 20017, severity 9"));
        assert!(d.is_disconnect(&"(20006, b'Error 10054 (Connection reset by peer)')"));
        assert!(d.is_disconnect(&DialectError::driver("Connection is closed.")));
        assert!(!d.is_disconnect(&"syntax error near SELECT"));
        assert!(!d.is_disconnect(&"connection is closed"));
    }

    #[test]
    fn test_every_disconnect_message_matches() {
        for msg in DISCONNECT_MESSAGES {
            assert!(is_disconnect_message(&format!("prefix {} suffix", msg)));
        }
        assert_eq!(DISCONNECT_MESSAGES.len(), 8);
    }

    #[test]
    fn test_classify_error() {
        let d = dialect();
        let err = d.classify_error(DialectError::driver("Not connected to any MS SQL server"));
        assert!(err.is_disconnect());

        let err = d.classify_error(DialectError::driver("Invalid column name 'x'"));
        assert_eq!(err, DialectError::driver("Invalid column name 'x'"));

        let err = d.classify_error(DialectError::conversion("Connection is closed"));
        assert!(!err.is_disconnect());
    }

    // Server version

    #[tokio::test]
    async fn test_server_version_info() {
        let d = dialect();
        let mut conn =
            RecordingConnection::new().with_scalar("Microsoft SQL Server ... - 12.0.2000.8");
        let v = d.server_version_info(&mut conn).await.unwrap();
        assert_eq!(v.map(|v| v.as_tuple()), Some((12, 0, 2000, 8)));
        assert_eq!(conn.calls(), vec![Call::Scalar("select @@version".to_string())]);

        let mut conn = RecordingConnection::new().with_scalar("unknown");
        assert_eq!(d.server_version_info(&mut conn).await.unwrap(), None);

        let mut conn = RecordingConnection::new();
        assert_eq!(d.server_version_info(&mut conn).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_version_driver_error_is_classified() {
        let d = dialect();
        let mut conn =
            RecordingConnection::new().failing(DialectError::driver("message 20003 timeout"));
        let err = d.server_version_info(&mut conn).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    // Isolation levels

    #[tokio::test]
    async fn test_autocommit_issues_no_sql() {
        let d = dialect();
        let mut conn = RecordingConnection::new();
        d.set_isolation_level(&mut conn, IsolationLevel::Autocommit)
            .await
            .unwrap();
        assert_eq!(conn.calls(), vec![Call::SetAutocommit(true)]);
    }

    #[tokio::test]
    async fn test_serializable_disables_autocommit_first() {
        let d = dialect();
        let mut conn = RecordingConnection::new();
        d.set_isolation_level(&mut conn, IsolationLevel::Serializable)
            .await
            .unwrap();
        assert_eq!(
            conn.calls(),
            vec![
                Call::SetAutocommit(false),
                Call::Execute("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_snapshot_commits_after_set() {
        let d = dialect();
        let mut conn = RecordingConnection::new();
        d.set_isolation_level(&mut conn, IsolationLevel::Snapshot)
            .await
            .unwrap();
        assert_eq!(
            conn.calls(),
            vec![
                Call::SetAutocommit(false),
                Call::Execute("SET TRANSACTION ISOLATION LEVEL SNAPSHOT".to_string()),
                Call::Commit,
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_isolation_level() {
        let d = dialect();
        let mut conn = RecordingConnection::new();
        d.reset_isolation_level(&mut conn).await.unwrap();
        assert_eq!(
            conn.calls(),
            vec![
                Call::SetAutocommit(false),
                Call::Execute("SET TRANSACTION ISOLATION LEVEL READ COMMITTED".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_isolation_level() {
        let d = dialect();
        let mut conn = RecordingConnection::new().with_scalar("SNAPSHOT");
        assert_eq!(
            d.get_isolation_level(&mut conn).await.unwrap(),
            IsolationLevel::Snapshot
        );
    }

    // Connect flow

    #[tokio::test]
    async fn test_connect() {
        let conn = RecordingConnection::new().with_scalar(
            "Microsoft SQL Server 2019 (RTM-CU18) (KB5017593) - 15.0.4261.1 (X64)",
        );
        let provider = Arc::new(RecordingDbapi::new().with_connection(conn.clone()));
        let d = MinitdsDialect::new(provider.clone())
            .with_isolation_level(IsolationLevel::Autocommit);

        let opened = d
            .connect(&url("mssql+minitds://sa:pw@db.local:1444/app"))
            .await
            .unwrap();

        assert_eq!(opened.server_version(), Some(ServerVersion::new(15, 0, 4261, 1)));
        assert!(opened.capabilities().supports_offset_fetch());

        let connects = provider.connects();
        assert_eq!(connects.len(), 1);
        assert_eq!(connects[0].options.get_str("host"), Some("db.local:1444"));
        assert_eq!(
            conn.calls(),
            vec![
                Call::Scalar("select @@version".to_string()),
                Call::SetAutocommit(true),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_without_version_detection() {
        let conn = RecordingConnection::new();
        let provider = Arc::new(RecordingDbapi::new().with_connection(conn.clone()));
        let d = MinitdsDialect::new(provider).with_version_detection(false);

        let opened = d.connect(&url("mssql+minitds://h/db")).await.unwrap();
        assert_eq!(opened.server_version(), None);
        assert!(!opened.capabilities().supports_offset_fetch());
        assert!(conn.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_refused_is_classified() {
        let provider = Arc::new(
            RecordingDbapi::new()
                .refusing(DialectError::driver("Adaptive Server connection timed out")),
        );
        let d = MinitdsDialect::new(provider);
        let err = d.connect(&url("mssql+minitds://h/db")).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_from_config() {
        let config = MinitdsConfig::from_connection_string("mssql+minitds://h/db")
            .unwrap()
            .with_isolation_level(IsolationLevel::Serializable)
            .with_version_detection(false);
        let d = MinitdsDialect::from_config(&config, Arc::new(RecordingDbapi::new()));
        assert_eq!(d.isolation_level, Some(IsolationLevel::Serializable));
        assert!(!d.detect_version);
    }
}
