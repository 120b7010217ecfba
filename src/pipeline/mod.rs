//! Ingestion pipeline.
//!
//! For each wallet:
//! 1. Load its mail credentials and decrypt their tokens
//! 2. `MailGateway::search_from_date_and_senders()` (refreshing tokens when needed)
//! 3. Archive the fetched messages
//! 4. `ParserRegistry::parse()` into candidate transactions; statement PDFs
//!    go through the `StatementTextExtractor` first
//! 5. Resolve references, apply category rules, upsert the batch
//!
//! A credential that fails is reported and skipped. It is never deleted.

pub mod orchestrator;
pub mod sync_loop;
pub mod types;

pub use orchestrator::SyncOrchestrator;
pub use sync_loop::{run_once, spawn_sync_loop, window_start};
pub use types::{CredentialFailure, CredentialFailureKind, MessageFailure, SyncReport};
