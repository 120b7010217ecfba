//! Nu Colombia notification emails.
//!
//! Recognized subjects (lowercased substring match):
//! - `" con cuenta nu"`: purchase paid from the Nu account
//! - `"tu dinero ya va en camino"`: transfer to another bank
//! - `"el dinero que enviaste ya está del otro lado"`: transfer to another Nu account
//! - `"extracto de tu tarjeta"` / `"extracto de tu cuenta"`: statements; no body
//!   transactions, the movements come from the PDF attachment (see `nu_statement`)

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::extract::TransactionParser;
use crate::extract::amount::outflow_or_zero;
use crate::extract::html;
use crate::extract::nu_statement;
use crate::ledger::{Transaction, TransactionType};
use crate::mail::MailMessage;

pub const NU_BANK_SENDER: &str = "nu@nu.com.co";
pub const NU_BANK_ORIGIN: &str = "nu-bank-email";
pub const TAX_DESCRIPTION: &str = "4x1.000";

const PAYMENT: &str = " con cuenta nu";
const TRANSFER_TO_EXTERNAL_BANK: &str = "tu dinero ya va en camino";
const TRANSFER_TO_NU_BANK: &str = "el dinero que enviaste ya está del otro lado";
const CREDIT_CARD_STATEMENT: &str = "extracto de tu tarjeta";
const SAVING_ACCOUNT_STATEMENT: &str = "extracto de tu cuenta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NuSubject {
    Payment,
    TransferToExternalBank,
    TransferToNuBank,
    Statement,
}

fn classify(subject: &str) -> Option<NuSubject> {
    let subject = subject.to_lowercase();
    if subject.contains(PAYMENT) {
        Some(NuSubject::Payment)
    } else if subject.contains(TRANSFER_TO_NU_BANK) {
        Some(NuSubject::TransferToNuBank)
    } else if subject.contains(TRANSFER_TO_EXTERNAL_BANK) {
        Some(NuSubject::TransferToExternalBank)
    } else if subject.contains(CREDIT_CARD_STATEMENT) || subject.contains(SAVING_ACCOUNT_STATEMENT) {
        Some(NuSubject::Statement)
    } else {
        None
    }
}

// ── Field patterns ──────────────────────────────────────────────────

struct Patterns {
    transfer_amount: Regex,
    transfer_tax: Regex,
    payment_amount: Regex,
    payment_tax: Regex,
    nu_receiver: Regex,
    receiver: Regex,
    bank: Regex,
    merchant: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        transfer_amount: Regex::new(r"Monto\n\$([\d\.,]+)\n").unwrap(),
        transfer_tax: Regex::new(r"Impuesto del 4x1\.000\n\$([\d\.,]+)\n").unwrap(),
        payment_amount: Regex::new(r"La cantidad de:\n\$([\d\.,]+)\n").unwrap(),
        payment_tax: Regex::new(r"Más el impuesto del 4xmil de:\n\$([\d\.,]+)\n").unwrap(),
        nu_receiver: Regex::new(r"Recibe\n(.+) Nu").unwrap(),
        receiver: Regex::new(r"Recibe\n(.+)\n").unwrap(),
        bank: Regex::new(r"Banco\n(.+)\n").unwrap(),
        merchant: Regex::new(r"Pagaste en:\n(.+)\n").unwrap(),
    })
}

fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn amount_field(re: &Regex, text: &str, field: &str) -> Decimal {
    capture(re, text)
        .map(|raw| outflow_or_zero(raw, field))
        .unwrap_or(Decimal::ZERO)
}

fn nu_transfer_description(text: &str) -> String {
    capture(&patterns().nu_receiver, text)
        .map(|receiver| format!("Envío a {receiver}"))
        .unwrap_or_default()
}

fn external_transfer_description(text: &str) -> String {
    let p = patterns();
    let mut desc = capture(&p.receiver, text).unwrap_or_default().to_string();
    if let Some(bank) = capture(&p.bank, text) {
        desc.push_str(&format!(" ({bank})"));
    }
    desc
}

// ── Parser ──────────────────────────────────────────────────────────

/// Scrapes amount, receiver and 4x1.000 tax out of Nu notification bodies.
#[derive(Debug, Clone)]
pub struct NuBankParser {
    sender: String,
}

impl NuBankParser {
    pub fn new() -> Self {
        Self::with_sender(NU_BANK_SENDER)
    }

    pub fn with_sender(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into().to_lowercase(),
        }
    }
}

impl Default for NuBankParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionParser for NuBankParser {
    fn name(&self) -> &str {
        "nu-bank"
    }

    fn handles(&self, message: &MailMessage) -> bool {
        message.from.to_lowercase().contains(&self.sender)
    }

    fn parse(&self, message: &MailMessage) -> Vec<Transaction> {
        let Some(kind) = classify(&message.subject) else {
            debug!(message_id = %message.external_id, subject = %message.subject, "Unrecognized Nu subject");
            return Vec::new();
        };

        let text = html::normalize(&message.body);
        let p = patterns();

        let (amount, tax, description) = match kind {
            NuSubject::Payment => (
                amount_field(&p.payment_amount, &text, "payment_amount"),
                amount_field(&p.payment_tax, &text, "payment_tax"),
                capture(&p.merchant, &text).unwrap_or_default().to_string(),
            ),
            NuSubject::TransferToNuBank => (
                amount_field(&p.transfer_amount, &text, "transfer_amount"),
                amount_field(&p.transfer_tax, &text, "transfer_tax"),
                nu_transfer_description(&text),
            ),
            NuSubject::TransferToExternalBank => (
                amount_field(&p.transfer_amount, &text, "transfer_amount"),
                amount_field(&p.transfer_tax, &text, "transfer_tax"),
                external_transfer_description(&text),
            ),
            NuSubject::Statement => {
                debug!(message_id = %message.external_id, "Statement email, movements come from the attachment");
                return Vec::new();
            }
        };

        let principal = Transaction::candidate(
            NU_BANK_ORIGIN,
            message.external_id.clone(),
            TransactionType::Expense,
            amount,
            description,
            message.received_at,
        );
        let tax = Transaction::candidate(
            NU_BANK_ORIGIN,
            format!("{}_tax", message.external_id),
            TransactionType::Expense,
            tax,
            TAX_DESCRIPTION,
            message.received_at,
        );

        let out: Vec<Transaction> = [principal, tax]
            .into_iter()
            .filter(|t| !t.amount.is_zero())
            .collect();

        debug!(message_id = %message.external_id, count = out.len(), "Parsed Nu email");
        out
    }

    fn reads_statements(&self, message: &MailMessage) -> bool {
        classify(&message.subject) == Some(NuSubject::Statement)
    }

    fn parse_statement(&self, tsv: &str) -> Vec<Transaction> {
        nu_statement::parse_statement_tsv(tsv)
    }
}
