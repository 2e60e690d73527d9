//! SQL Server behavior shared by every driver.
//!
//! Bracket quoting, the T-SQL reserved words, the base type table and the
//! `SET TRANSACTION ISOLATION LEVEL` handling. Driver adapters such as
//! [`minitds`](crate::minitds) build on these pieces.

use std::sync::Arc;

use sqlweave_core::types::{BinaryType, NumericType, ResultProcessor, TypeImpl};
use sqlweave_core::{
    ColSpecs, DbapiConnection, Dialect, DialectError, DialectResult, IdentifierPreparer,
    IsolationLevel, Paramstyle, SqlType, SqlValue, TypeClass,
};
use tracing::debug;

/// Default SQL Server port.
pub const DEFAULT_PORT: u16 = 1433;

/// T-SQL reserved words (lowercase).
pub const RESERVED_WORDS: &[&str] = &[
    "add", "all", "alter", "and", "any", "as", "asc", "authorization", "backup", "begin",
    "between", "break", "browse", "bulk", "by", "cascade", "case", "check", "checkpoint",
    "close", "clustered", "coalesce", "collate", "column", "commit", "compute", "constraint",
    "contains", "containstable", "continue", "convert", "create", "cross", "current",
    "current_date", "current_time", "current_timestamp", "current_user", "cursor",
    "database", "dbcc", "deallocate", "declare", "default", "delete", "deny", "desc", "disk",
    "distinct", "distributed", "double", "drop", "dump", "else", "end", "errlvl", "escape",
    "except", "exec", "execute", "exists", "exit", "external", "fetch", "file", "fillfactor",
    "for", "foreign", "freetext", "freetexttable", "from", "full", "function", "goto",
    "grant", "group", "having", "holdlock", "identity", "identity_insert", "identitycol",
    "if", "in", "index", "inner", "insert", "intersect", "into", "is", "join", "key", "kill",
    "left", "like", "lineno", "load", "merge", "national", "nocheck", "nonclustered", "not",
    "null", "nullif", "of", "off", "offsets", "on", "open", "opendatasource", "openquery",
    "openrowset", "openxml", "option", "or", "order", "outer", "over", "percent", "pivot",
    "plan", "precision", "primary", "print", "proc", "procedure", "public", "raiserror",
    "read", "readtext", "reconfigure", "references", "replication", "restore", "restrict",
    "return", "revert", "revoke", "right", "rollback", "rowcount", "rowguidcol", "rule",
    "save", "schema", "securityaudit", "select", "session_user", "set", "setuser",
    "shutdown", "some", "statistics", "system_user", "table", "tablesample", "textsize",
    "then", "to", "top", "tran", "transaction", "trigger", "truncate", "tsequal", "union",
    "unique", "unpivot", "update", "updatetext", "use", "user", "values", "varying", "view",
    "waitfor", "when", "where", "while", "with", "writetext",
];

/// Isolation levels SQL Server accepts in `SET TRANSACTION ISOLATION LEVEL`.
pub const ISOLATION_LEVELS: &[IsolationLevel] = &[
    IsolationLevel::ReadUncommitted,
    IsolationLevel::ReadCommitted,
    IsolationLevel::RepeatableRead,
    IsolationLevel::Serializable,
    IsolationLevel::Snapshot,
];

/// Query reporting the isolation level of the current session.
pub const ISOLATION_LEVEL_QUERY: &str = "SELECT CASE transaction_isolation_level \
     WHEN 0 THEN NULL \
     WHEN 1 THEN 'READ UNCOMMITTED' \
     WHEN 2 THEN 'READ COMMITTED' \
     WHEN 3 THEN 'REPEATABLE READ' \
     WHEN 4 THEN 'SERIALIZABLE' \
     WHEN 5 THEN 'SNAPSHOT' END AS TRANSACTION_ISOLATION_LEVEL \
     FROM sys.dm_exec_sessions WHERE session_id = @@SPID";

/// Base type table for SQL Server.
pub static COLSPECS: ColSpecs = ColSpecs::new(&[
    (TypeClass::Numeric, NumericType::adapt),
    (TypeClass::Boolean, BitType::adapt),
    (TypeClass::Binary, binary_adapt),
]);

fn binary_adapt(_: &SqlType) -> Box<dyn TypeImpl> {
    Box::new(BinaryType)
}

/// Identifier preparer using `[` / `]` quoting.
pub fn identifier_preparer(paramstyle: Paramstyle) -> IdentifierPreparer {
    IdentifierPreparer::new(paramstyle)
        .with_quotes('[', ']')
        .with_reserved_words(RESERVED_WORDS)
}

/// BIT columns arrive as integers from most drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitType;

impl BitType {
    /// Adapter for [`ColSpecs`] tables.
    pub fn adapt(_: &SqlType) -> Box<dyn TypeImpl> {
        Box::new(Self)
    }
}

impl TypeImpl for BitType {
    fn result_processor(&self, _dialect: &dyn Dialect) -> Option<ResultProcessor> {
        Some(Arc::new(|value| match value {
            SqlValue::Int(i) => Ok(SqlValue::Bool(i != 0)),
            SqlValue::Null | SqlValue::Bool(_) => Ok(value),
            other => Err(DialectError::conversion(format!(
                "cannot read {} value as BIT",
                other.kind()
            ))),
        }))
    }
}

/// Issue `SET TRANSACTION ISOLATION LEVEL` for a SQL Server level.
///
/// `SNAPSHOT` is committed straight away so it applies to the next
/// transaction the driver opens.
pub async fn set_isolation_level(
    conn: &mut dyn DbapiConnection,
    level: IsolationLevel,
) -> DialectResult<()> {
    if !ISOLATION_LEVELS.contains(&level) {
        return Err(DialectError::InvalidIsolationLevel {
            level: level.as_sql().to_string(),
            valid: IsolationLevel::names(ISOLATION_LEVELS),
        });
    }

    debug!(level = %level, "SET TRANSACTION ISOLATION LEVEL");
    conn.execute(&format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()))
        .await?;
    if level == IsolationLevel::Snapshot {
        conn.commit().await?;
    }
    Ok(())
}

/// Read the isolation level of the current session.
pub async fn get_isolation_level(conn: &mut dyn DbapiConnection) -> DialectResult<IsolationLevel> {
    match conn.scalar(ISOLATION_LEVEL_QUERY).await? {
        SqlValue::Text(name) => name.parse(),
        SqlValue::Null => Err(DialectError::driver(
            "session reports an unspecified isolation level",
        )),
        other => Err(DialectError::conversion(format!(
            "unexpected {} value for the isolation level",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingConnection};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bracket_quoting() {
        let p = identifier_preparer(Paramstyle::Qmark);
        assert_eq!(p.quote("orders"), "orders");
        assert_eq!(p.quote("Order Details"), "[Order Details]");
        assert_eq!(p.quote("tran"), "[tran]");
        assert_eq!(p.quote_identifier("a]b"), "[a]]b]");
        assert_eq!(p.format_table(Some("dbo"), "Users"), "dbo.[Users]");
    }

    #[test]
    fn test_reserved_words_are_lowercase() {
        for word in RESERVED_WORDS {
            assert_eq!(*word, word.to_lowercase());
        }
    }

    #[test]
    fn test_colspecs_base() {
        let adapted = COLSPECS.adapt(&SqlType::numeric());
        assert!(format!("{:?}", adapted).starts_with("NumericType"));
        assert_eq!(format!("{:?}", COLSPECS.adapt(&SqlType::Boolean)), "BitType");
        assert_eq!(
            format!("{:?}", COLSPECS.adapt(&SqlType::Binary { length: None })),
            "BinaryType"
        );
    }

    #[tokio::test]
    async fn test_set_isolation_level_sql() {
        let mut conn = RecordingConnection::new();
        set_isolation_level(&mut conn, IsolationLevel::RepeatableRead)
            .await
            .unwrap();
        assert_eq!(
            conn.calls(),
            vec![Call::Execute(
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_snapshot_commits() {
        let mut conn = RecordingConnection::new();
        set_isolation_level(&mut conn, IsolationLevel::Snapshot)
            .await
            .unwrap();
        assert_eq!(
            conn.calls(),
            vec![
                Call::Execute("SET TRANSACTION ISOLATION LEVEL SNAPSHOT".to_string()),
                Call::Commit,
            ]
        );
    }

    #[tokio::test]
    async fn test_autocommit_rejected_by_base() {
        let mut conn = RecordingConnection::new();
        let err = set_isolation_level(&mut conn, IsolationLevel::Autocommit)
            .await
            .unwrap_err();
        assert!(matches!(err, DialectError::InvalidIsolationLevel { .. }));
        assert!(conn.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_isolation_level() {
        let mut conn = RecordingConnection::new().with_scalar("READ COMMITTED");
        let level = get_isolation_level(&mut conn).await.unwrap();
        assert_eq!(level, IsolationLevel::ReadCommitted);
        assert_eq!(
            conn.calls(),
            vec![Call::Scalar(ISOLATION_LEVEL_QUERY.to_string())]
        );

        let mut conn = RecordingConnection::new().with_scalar(SqlValue::Null);
        assert!(get_isolation_level(&mut conn).await.is_err());
    }

    #[test]
    fn test_bit_processor() {
        let bit = BitType;
        let dialect = crate::testing::dialect();
        let p = bit.result_processor(&dialect).unwrap();
        assert_eq!(p(SqlValue::Int(1)).unwrap(), SqlValue::Bool(true));
        assert_eq!(p(SqlValue::Int(0)).unwrap(), SqlValue::Bool(false));
        assert_eq!(p(SqlValue::Null).unwrap(), SqlValue::Null);
        assert!(p(SqlValue::from("x")).is_err());
    }
}
