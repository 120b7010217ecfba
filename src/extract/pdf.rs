//! PDF statement attachments: base64 decode, then `pdftotext -tsv`.
//!
//! The tool prints one row per page, flow, line and word with its position on
//! the page. Structure rows carry `###PAGE###`, `###FLOW###` or `###LINE###`
//! as their text.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExtractError;

pub const PAGE_MARKER: &str = "###PAGE###";
pub const FLOW_MARKER: &str = "###FLOW###";
pub const LINE_MARKER: &str = "###LINE###";

/// One positioned row of `pdftotext -tsv` output.
#[derive(Debug, Clone, PartialEq)]
pub struct TsvWord {
    pub page: u32,
    pub left: f64,
    pub top: f64,
    pub text: String,
}

impl TsvWord {
    pub fn is_marker(&self) -> bool {
        matches!(self.text.as_str(), PAGE_MARKER | FLOW_MARKER | LINE_MARKER)
    }

    pub fn is_flow(&self) -> bool {
        self.text == FLOW_MARKER
    }
}

/// Parse TSV rows, skipping the header and anything without twelve columns.
///
/// Columns: level, page, par, block, line, word, left, top, width, height, conf, text.
pub fn parse_tsv(tsv: &str) -> Vec<TsvWord> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() != 12 {
                return None;
            }
            Some(TsvWord {
                page: cols[1].parse().ok()?,
                left: cols[6].parse().ok()?,
                top: cols[7].parse().ok()?,
                text: cols[11].trim().to_string(),
            })
        })
        .filter(|w| !w.text.is_empty())
        .collect()
}

/// Decode an attachment's standard base64 content. Line breaks are tolerated.
pub fn decode_attachment(content: &str) -> Result<Vec<u8>, ExtractError> {
    let compact: String = content.split_whitespace().collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ExtractError::Decode(e.to_string()))
}

/// Turns statement PDF bytes into `pdftotext -tsv` text.
#[async_trait]
pub trait StatementTextExtractor: Send + Sync {
    /// Try the file unprotected first, then each password in order.
    async fn to_tsv(&self, pdf: &[u8], passwords: &[String]) -> Result<String, ExtractError>;
}

/// Runs poppler's `pdftotext` as a child process.
#[derive(Debug, Clone)]
pub struct PdfToText {
    program: PathBuf,
}

impl PdfToText {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, pdf_path: &Path, password: Option<&str>) -> Result<String, ExtractError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-tsv");
        if let Some(password) = password {
            cmd.arg("-upw").arg(password);
        }
        cmd.arg(pdf_path).arg("-");

        let output = cmd.output().await.map_err(|e| {
            ExtractError::Io(format!("failed to run {}: {e}", self.program.display()))
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(ExtractError::Tool {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for PdfToText {
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

#[async_trait]
impl StatementTextExtractor for PdfToText {
    async fn to_tsv(&self, pdf: &[u8], passwords: &[String]) -> Result<String, ExtractError> {
        // Removed when dropped.
        let file = tempfile::Builder::new()
            .prefix("statement-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| ExtractError::Io(format!("temp file: {e}")))?;
        tokio::fs::write(file.path(), pdf)
            .await
            .map_err(|e| ExtractError::Io(format!("temp file: {e}")))?;

        let attempts = std::iter::once(None).chain(passwords.iter().map(|p| Some(p.as_str())));
        let mut last_error = None;
        for (attempt, password) in attempts.enumerate() {
            match self.run(file.path(), password).await {
                Ok(tsv) => {
                    debug!(attempt, bytes = tsv.len(), "Statement converted");
                    return Ok(tsv);
                }
                // The tool itself is missing; other passwords will not help.
                Err(e @ ExtractError::Io(_)) => return Err(e),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ExtractError::Tool {
            status: None,
            stderr: "no attempt made".into(),
        }))
    }
}
