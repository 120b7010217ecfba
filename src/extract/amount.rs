//! Colombian-format amounts: `.` groups thousands, `,` marks decimals.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;

/// Parse `300.000,00` as `300000.00`.
pub fn parse_amount(raw: &str) -> Result<Decimal, rust_decimal::Error> {
    let normalized = raw.trim().replace('.', "").replace(',', ".");
    Decimal::from_str(&normalized)
}

/// Parse a captured amount and negate it; a bad capture logs and yields zero.
pub fn outflow_or_zero(raw: &str, field: &str) -> Decimal {
    match parse_amount(raw) {
        Ok(amount) => -amount,
        Err(e) => {
            warn!(field, raw, error = %e, "Could not parse amount, using zero");
            Decimal::ZERO
        }
    }
}
