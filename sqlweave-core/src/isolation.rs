//! Transaction isolation levels.
//!
//! ```rust
//! use sqlweave_core::IsolationLevel;
//!
//! let level: IsolationLevel = "repeatable_read".parse().unwrap();
//! assert_eq!(level, IsolationLevel::RepeatableRead);
//! assert_eq!(level.as_sql(), "REPEATABLE READ");
//! assert!("AUTOCOMMIT".parse::<IsolationLevel>().unwrap().is_autocommit());
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::DialectError;

/// Transaction isolation levels, plus the driver-level autocommit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// No transaction; every statement commits on its own.
    Autocommit,
    /// Read uncommitted - allows dirty reads.
    ReadUncommitted,
    /// Read committed - prevents dirty reads.
    #[default]
    ReadCommitted,
    /// Repeatable read - prevents non-repeatable reads.
    RepeatableRead,
    /// Serializable - highest isolation level.
    Serializable,
    /// Row versioning snapshot (SQL Server).
    Snapshot,
}

impl IsolationLevel {
    /// Every level, in order of increasing isolation.
    pub const ALL: [IsolationLevel; 6] = [
        Self::Autocommit,
        Self::ReadUncommitted,
        Self::ReadCommitted,
        Self::RepeatableRead,
        Self::Serializable,
        Self::Snapshot,
    ];

    /// Get the SQL name of this level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Autocommit => "AUTOCOMMIT",
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
            Self::Snapshot => "SNAPSHOT",
        }
    }

    /// Check if this is the autocommit sentinel rather than a SQL level.
    pub fn is_autocommit(&self) -> bool {
        matches!(self, Self::Autocommit)
    }

    /// Comma separated names of the given levels, for error messages.
    pub fn names(levels: &[IsolationLevel]) -> String {
        levels
            .iter()
            .map(IsolationLevel::as_sql)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = DialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('_', " ");
        Self::ALL
            .into_iter()
            .find(|level| level.as_sql() == normalized)
            .ok_or_else(|| DialectError::InvalidIsolationLevel {
                level: s.to_string(),
                valid: Self::names(&Self::ALL),
            })
    }
}
