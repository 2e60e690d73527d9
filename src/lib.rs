//! # sqlweave
//!
//! Database dialect adapters. A dialect describes how one backend and driver
//! pair expects connect arguments, identifiers, isolation levels and result
//! values; the driver itself is injected.
//!
//! sqlweave provides:
//! - The dialect seams in [`dialect`]: URLs, connect options, result processors,
//!   identifier quoting, isolation levels and the driver traits
//! - SQL Server through the `minitds` driver in [`mssql`] (feature `mssql`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use sqlweave::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DialectError> {
//!     sqlweave::init_logging();
//!
//!     let config = MinitdsConfig::from_env()?;
//!     let dialect = MinitdsDialect::from_config(&config, Arc::new(TiberiusDbapi::new()));
//!
//!     let mut conn = dialect.connect(config.url()).await?;
//!     dialect
//!         .set_isolation_level(conn.dbapi_connection(), IsolationLevel::Serializable)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Dialect seams shared by every backend.
pub mod dialect {
    pub use sqlweave_core::*;
}

/// Microsoft SQL Server.
#[cfg(feature = "mssql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mssql")))]
pub mod mssql {
    pub use sqlweave_mssql::*;
}

/// Install the environment driven `tracing` subscriber.
///
/// See [`dialect::logging`] for the variables it reads.
pub fn init_logging() {
    sqlweave_core::logging::init();
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use sqlweave_core::prelude::*;

    #[cfg(feature = "mssql")]
    pub use sqlweave_mssql::prelude::*;
}

// Re-export key types at the crate root
pub use sqlweave_core::{DatabaseUrl, Dialect, DialectError, DialectResult, IsolationLevel};
