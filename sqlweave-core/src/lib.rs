//! # sqlweave-core
//!
//! The seams a database dialect plugs into:
//!
//! - [`DatabaseUrl`] parsing and [`ConnectArgs`] for driver connect calls
//! - [`SqlValue`] / [`SqlType`] and the result and bind processors attached to them
//! - [`IdentifierPreparer`] for quoting identifiers and escaping literal text
//! - [`IsolationLevel`] and [`ServerVersion`]
//! - [`DbapiProvider`] / [`DbapiConnection`], the driver traits
//! - [`Dialect`], with the generic behavior as provided methods
//!
//! Concrete dialects live in their own crates, e.g. `sqlweave-mssql`.

pub mod dbapi;
pub mod dialect;
pub mod error;
pub mod isolation;
pub mod logging;
pub mod options;
pub mod preparer;
pub mod types;
pub mod url;
pub mod version;

pub use dbapi::{DbapiConnection, DbapiProvider};
pub use dialect::{Dialect, Paramstyle};
pub use error::{DialectError, DialectResult};
pub use isolation::IsolationLevel;
pub use options::{ConnectArgs, ConnectOptions, OptionValue};
pub use preparer::IdentifierPreparer;
pub use types::{
    BindProcessor, ColSpecs, ResultProcessor, SqlType, SqlValue, TypeAdapter, TypeClass,
    TypeImpl,
};
pub use crate::url::DatabaseUrl;
pub use version::ServerVersion;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dbapi::{DbapiConnection, DbapiProvider};
    pub use crate::dialect::{Dialect, Paramstyle};
    pub use crate::error::{DialectError, DialectResult};
    pub use crate::isolation::IsolationLevel;
    pub use crate::options::{ConnectArgs, ConnectOptions, OptionValue};
    pub use crate::types::{SqlType, SqlValue};
    pub use crate::url::DatabaseUrl;
    pub use crate::version::ServerVersion;
}
