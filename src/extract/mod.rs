//! Transaction extraction: one parser per bank notification format.

pub mod amount;
pub mod html;
pub mod nu_bank;
pub mod nu_statement;
pub mod pdf;

use std::sync::Arc;

use tracing::{debug, info};

use crate::ledger::Transaction;
use crate::mail::MailMessage;

pub use nu_bank::NuBankParser;
pub use pdf::{PdfToText, StatementTextExtractor};

/// Turns one mail message into zero or more candidate transactions.
///
/// Parsing never fails: fields that cannot be read become zero/empty and
/// zero-amount candidates are dropped.
pub trait TransactionParser: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this parser understands messages from `message.from`.
    fn handles(&self, message: &MailMessage) -> bool;

    fn parse(&self, message: &MailMessage) -> Vec<Transaction>;

    /// Whether the PDF attachments of `message` are statements this parser reads.
    fn reads_statements(&self, _message: &MailMessage) -> bool {
        false
    }

    /// Candidates from one statement's `pdftotext -tsv` output.
    fn parse_statement(&self, _tsv: &str) -> Vec<Transaction> {
        Vec::new()
    }
}

/// Parsers in registration order; the first that handles a message wins.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn TransactionParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in bank parser.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NuBankParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn TransactionParser>) {
        info!(parser = parser.name(), "Registered transaction parser");
        self.parsers.push(parser);
    }

    pub fn parser_for(&self, message: &MailMessage) -> Option<&dyn TransactionParser> {
        self.parsers
            .iter()
            .find(|p| p.handles(message))
            .map(|p| p.as_ref())
    }

    /// Parse with the matching parser. `None` means no parser handles the sender.
    pub fn parse(&self, message: &MailMessage) -> Option<Vec<Transaction>> {
        let Some(parser) = self.parser_for(message) else {
            debug!(message_id = %message.external_id, from = %message.from, "No parser for sender");
            return None;
        };
        Some(parser.parse(message))
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
