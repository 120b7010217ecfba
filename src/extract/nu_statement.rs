//! Nu savings account statements, read from `pdftotext -tsv` output.
//!
//! Page one is the summary. From page two on, the movements section starts
//! after the "Movimientos" heading and each movement begins with a flow
//! anchored at the left margin: day, month abbreviation, description words,
//! then signed amounts (`-$300.000,00`). A movement that paid the 4x1000 tax
//! carries a second amount for it.

use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::extract::amount::parse_amount;
use crate::extract::nu_bank::TAX_DESCRIPTION;
use crate::extract::pdf::{TsvWord, parse_tsv};
use crate::ledger::{Transaction, TransactionType};

pub const NU_STATEMENT_ORIGIN: &str = "nu/savings";

const YEAR_LEFT: f64 = 288.06;
const MOVEMENT_LEFT: f64 = 68.0;
const PAGE_COUNTER_LEFT: f64 = 809.598;
const POSITION_TOLERANCE: f64 = 0.01;

const MOVEMENTS_HEADING: &str = "Movimientos";
const FOOTER_START: &str = "¿Tienes";
const NU_NIT: &str = "901.658.107-2";

fn near(a: f64, b: f64) -> bool {
    (a - b).abs() < POSITION_TOLERANCE
}

fn amount_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([+-])\$([\d.,]+)$").unwrap())
}

fn legal_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bS A\b").unwrap())
}

/// The statement year printed in the page one header.
fn statement_year(words: &[TsvWord]) -> Option<i32> {
    words
        .iter()
        .find(|w| near(w.left, YEAR_LEFT) && w.text.len() == 4 && w.text.chars().all(|c| c.is_ascii_digit()))
        .and_then(|w| w.text.parse().ok())
}

fn month_number(name: &str) -> Option<u32> {
    let abbreviation: String = name.to_lowercase().chars().take(3).collect();
    let month = match abbreviation.as_str() {
        "ene" => 1,
        "feb" => 2,
        "mar" => 3,
        "abr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "ago" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dic" => 12,
        _ => return None,
    };
    Some(month)
}

fn clean_description(raw: &str) -> String {
    let replaced = raw.replace("Enviaste", "Envío");
    legal_suffix().replace_all(&replaced, "SA").into_owned()
}

/// A `###FLOW###` row and the words that follow it.
struct Flow<'a> {
    anchor: &'a TsvWord,
    words: Vec<&'a TsvWord>,
}

impl Flow<'_> {
    fn contains(&self, text: &str) -> bool {
        self.words.iter().any(|w| w.text == text)
    }

    /// Interest notes, page counters and Nu's legal block.
    fn is_noise(&self) -> bool {
        near(self.anchor.left, PAGE_COUNTER_LEFT)
            || self.words.iter().any(|w| {
                let lower = w.text.to_lowercase();
                lower.starts_with("rendimiento")
                    || lower == "diario"
                    || lower == "diario."
                    || w.text == NU_NIT
                    || w.text == "Financiamiento"
            })
    }
}

fn flows<'a>(rows: &[&'a TsvWord]) -> Vec<Flow<'a>> {
    let mut out: Vec<Flow<'a>> = Vec::new();
    for row in rows {
        if row.is_flow() {
            out.push(Flow {
                anchor: row,
                words: Vec::new(),
            });
        } else if !row.is_marker()
            && let Some(current) = out.last_mut()
        {
            current.words.push(row);
        }
    }
    out
}

/// Word texts of each movement on one page, in reading order.
fn movement_blocks<'a>(page: &[&'a TsvWord]) -> Vec<Vec<&'a str>> {
    let Some(heading) = page.iter().position(|w| w.text == MOVEMENTS_HEADING) else {
        return Vec::new();
    };

    let mut kept: Vec<&TsvWord> = Vec::new();
    for flow in flows(&page[heading + 1..]) {
        if flow.contains(FOOTER_START) {
            break;
        }
        if flow.is_noise() {
            continue;
        }
        kept.push(flow.anchor);
        kept.extend(flow.words);
    }

    kept.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));

    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for row in kept {
        if row.is_flow() {
            if near(row.left, MOVEMENT_LEFT) {
                blocks.push(Vec::new());
            }
        } else if let Some(block) = blocks.last_mut() {
            block.push(row.text.as_str());
        }
    }
    blocks.retain(|b| !b.is_empty());
    blocks
}

fn signed_amount(token: &str) -> Option<Decimal> {
    let caps = amount_token().captures(token)?;
    let magnitude = match parse_amount(&caps[2]) {
        Ok(v) => v,
        Err(e) => {
            warn!(raw = token, error = %e, "Could not parse statement amount, using zero");
            Decimal::ZERO
        }
    };
    Some(if &caps[1] == "-" { -magnitude } else { magnitude })
}

/// One movement: principal plus optional 4x1000 tax. Zero amounts are dropped.
fn parse_movement(words: &[&str], year: i32) -> Vec<Transaction> {
    let date = words
        .first()
        .and_then(|d| d.parse::<u32>().ok())
        .zip(words.get(1).and_then(|m| month_number(m)))
        .and_then(|(day, month)| Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single());
    let Some(date) = date else {
        warn!(block = %words.join(" "), "Statement movement without a readable date");
        return Vec::new();
    };

    let amounts: Vec<(usize, Decimal)> = words
        .iter()
        .enumerate()
        .filter_map(|(i, w)| signed_amount(w).map(|a| (i, a)))
        .collect();
    let Some(&(first, amount)) = amounts.first() else {
        warn!(block = %words.join(" "), "Statement movement without an amount");
        return Vec::new();
    };
    let tax = if words.iter().any(|w| w.contains("4x1000")) {
        amounts.get(1).map(|&(_, a)| a).unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    let description = clean_description(&words[2.min(first)..first].join(" "));
    let kind = if amount > Decimal::ZERO {
        TransactionType::Income
    } else {
        TransactionType::Expense
    };

    [
        Transaction::candidate(NU_STATEMENT_ORIGIN, "", kind, amount, description, date),
        statement_tax(tax, date),
    ]
    .into_iter()
    .filter(|t| !t.amount.is_zero())
    .collect()
}

fn statement_tax(amount: Decimal, date: DateTime<Utc>) -> Transaction {
    Transaction::candidate(
        NU_STATEMENT_ORIGIN,
        "",
        TransactionType::Expense,
        amount,
        TAX_DESCRIPTION,
        date,
    )
}

/// Candidates from a whole statement. References are left empty so each row
/// gets a fallback reference.
pub fn parse_statement_tsv(tsv: &str) -> Vec<Transaction> {
    let words = parse_tsv(tsv);
    let Some(year) = statement_year(&words) else {
        warn!("Statement year not found, skipping statement");
        return Vec::new();
    };

    let mut pages: Vec<u32> = words.iter().map(|w| w.page).filter(|&p| p > 1).collect();
    pages.dedup();

    let mut out = Vec::new();
    for page in pages {
        let rows: Vec<&TsvWord> = words.iter().filter(|w| w.page == page).collect();
        let blocks = movement_blocks(&rows);
        debug!(page, movements = blocks.len(), "Statement page read");
        for block in blocks {
            out.extend(parse_movement(&block, year));
        }
    }
    out
}

/// A small two-page statement in `pdftotext -tsv` layout.
#[cfg(test)]
pub(crate) fn sample_statement_tsv() -> String {
    fn row(page: u32, left: f64, top: f64, text: &str) -> String {
        let (level, conf) = match text {
            "###PAGE###" => (1, -1),
            "###FLOW###" => (2, -1),
            "###LINE###" => (4, -1),
            _ => (5, 96),
        };
        format!("{level}\t{page}\t0\t0\t0\t0\t{left:.6}\t{top:.6}\t10.000000\t9.000000\t{conf}\t{text}")
    }

    let mut rows = vec![
        "level\tpage_num\tpar_num\tblock_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext"
            .to_string(),
    ];
    let mut push = |page: u32, items: &[(f64, f64, &str)]| {
        rows.extend(items.iter().map(|&(left, top, text)| row(page, left, top, text)));
    };

    // Page one: header and a summary that is never read as movements.
    push(1, &[
        (0.0, 0.0, "###PAGE###"),
        (250.0, 40.0, "###FLOW###"),
        (250.0, 40.0, "Extracto"),
        (288.06, 40.0, "2025"),
        (68.0, 300.0, "###FLOW###"),
        (68.0, 300.0, "Movimientos"),
        (68.0, 320.0, "###FLOW###"),
        (68.0, 320.0, "01"),
        (85.0, 320.0, "ENE"),
        (120.0, 320.0, "Saldo"),
        (700.0, 320.0, "-$5,00"),
    ]);

    push(2, &[
        (0.0, 0.0, "###PAGE###"),
        (68.0, 100.0, "###FLOW###"),
        (68.0, 100.0, "###LINE###"),
        (68.0, 100.0, "Movimientos"),
        // Transfer with 4x1000 tax; the amount column is its own flow.
        (68.0, 150.0, "###FLOW###"),
        (68.0, 150.0, "12"),
        (85.0, 150.0, "ENE"),
        (120.0, 150.0, "###FLOW###"),
        (120.0, 150.0, "Enviaste"),
        (170.0, 150.0, "a"),
        (185.0, 150.0, "Diana"),
        (215.0, 150.0, "E."),
        (120.0, 162.0, "Impuesto"),
        (170.0, 162.0, "4x1000"),
        (700.0, 150.0, "###FLOW###"),
        (700.0, 150.0, "-$300.000,00"),
        (700.0, 162.0, "-$1.200,00"),
        // Interest note, dropped.
        (68.0, 180.0, "###FLOW###"),
        (68.0, 180.0, "31"),
        (85.0, 180.0, "ENE"),
        (120.0, 180.0, "Rendimientos"),
        (180.0, 180.0, "diario"),
        (700.0, 180.0, "+$3.000,00"),
        (68.0, 200.0, "###FLOW###"),
        (68.0, 200.0, "15"),
        (85.0, 200.0, "FEB"),
        (120.0, 200.0, "Recibiste"),
        (170.0, 200.0, "de"),
        (185.0, 200.0, "Carlos"),
        (700.0, 200.0, "+$50.000,00"),
        // Page counter, dropped.
        (809.598, 560.0, "###FLOW###"),
        (809.598, 560.0, "2"),
        (815.0, 560.0, "/"),
        (820.0, 560.0, "2"),
        // Footer and everything after it, dropped.
        (68.0, 600.0, "###FLOW###"),
        (68.0, 600.0, "¿Tienes"),
        (110.0, 600.0, "preguntas?"),
        (68.0, 650.0, "###FLOW###"),
        (68.0, 650.0, "01"),
        (85.0, 650.0, "ENE"),
        (120.0, 650.0, "Nada"),
        (700.0, 650.0, "-$9,00"),
    ]);

    rows.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn reads_movements_from_later_pages() {
        let out = parse_statement_tsv(&sample_statement_tsv());

        assert_eq!(out.len(), 3, "{out:#?}");

        assert_eq!(out[0].system_description, "Envío a Diana E.");
        assert_eq!(out[0].amount, dec!(-300000));
        assert_eq!(out[0].transaction_type, TransactionType::Expense);
        assert_eq!(out[0].processed_at, day(1, 12));
        assert_eq!(out[0].origin, NU_STATEMENT_ORIGIN);
        assert!(out[0].reference.is_empty());

        assert_eq!(out[1].system_description, TAX_DESCRIPTION);
        assert_eq!(out[1].amount, dec!(-1200));
        assert_eq!(out[1].processed_at, day(1, 12));

        assert_eq!(out[2].system_description, "Recibiste de Carlos");
        assert_eq!(out[2].amount, dec!(50000));
        assert_eq!(out[2].transaction_type, TransactionType::Income);
        assert_eq!(out[2].processed_at, day(2, 15));
    }

    #[test]
    fn statement_without_year_yields_nothing() {
        let tsv = sample_statement_tsv().replace("288.060000", "300.000000");
        assert!(parse_statement_tsv(&tsv).is_empty());
    }

    #[test]
    fn month_abbreviations() {
        assert_eq!(month_number("ENE"), Some(1));
        assert_eq!(month_number("dic"), Some(12));
        assert_eq!(month_number("Agosto"), Some(8));
        assert_eq!(month_number("xyz"), None);
    }

    #[test]
    fn descriptions_are_normalized() {
        assert_eq!(clean_description("Enviaste a Diana"), "Envío a Diana");
        assert_eq!(clean_description("TECNIPAGOS S A"), "TECNIPAGOS SA");
        assert_eq!(clean_description("CASA SAS"), "CASA SAS");
    }

    #[test]
    fn movement_without_tax_marker_ignores_second_amount() {
        let out = parse_movement(&["03", "MAR", "RAPPI", "-$20.000,00", "-$80,00"], 2025);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].amount, dec!(-20000));
        assert_eq!(out[0].system_description, "RAPPI");
    }

    #[test]
    fn unreadable_date_skips_movement() {
        assert!(parse_movement(&["xx", "MAR", "RAPPI", "-$1,00"], 2025).is_empty());
        assert!(parse_movement(&["31", "FEB", "RAPPI", "-$1,00"], 2025).is_empty());
    }
}
