//! Engine-neutral schema description and dialect-aware DDL generation.
//!
//! `ctxdb-schema` is the I/O-free half of the context store's schema
//! evolution subsystem:
//!
//! - **Engine** - the supported engines and their [`Capabilities`] table
//! - **Schema** - table, column and index descriptions used by migration units
//! - **Dialect** - per-engine spelling of the structural statements
//! - **Value** - bind parameters and decoded column values
//!
//! # Example
//!
//! ```rust
//! use ctxdb_schema::prelude::*;
//!
//! let table = TableSchema::new("m_layers")
//!     .column(ColumnSchema::id("id"))
//!     .column(ColumnSchema::new("name", SqlType::Varchar(100)).not_null().unique());
//!
//! let sql = dialect_for(EngineKind::Postgres).create_table_sql(&table, true);
//! assert!(sql.contains("BIGSERIAL PRIMARY KEY"));
//! ```

pub mod dialect;
pub mod engine;
pub mod schema;
pub mod value;

pub use engine::{Capabilities, EngineKind, UnknownEngine};
pub use value::SqlValue;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{
        dialect_for, MigrationDialect, MysqlDialect, PostgresDialect, SqliteDialect,
    };
    pub use crate::engine::{Capabilities, EngineKind, UnknownEngine};
    pub use crate::schema::{
        ColumnSchema, DefaultValue, ForeignKeyAction, ForeignKeyRef, IndexSchema, SqlType,
        TableSchema,
    };
    pub use crate::value::SqlValue;
}
