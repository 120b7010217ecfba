//! Mail ledger: turns bank notification emails into wallet transactions.

pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod ids;
pub mod ledger;
pub mod mail;
pub mod pipeline;
pub mod store;
