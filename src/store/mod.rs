//! Persistence layer: libSQL-backed storage for credentials, mail, and the ledger.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, MailCredential};
