//! Identifier generation.
//!
//! Identifiers are UUIDv7: globally unique and ordered by creation time, so
//! their simple (hyphen-free) form sorts lexically.

use chrono::{DateTime, Utc};
use uuid::{NoContext, Timestamp, Uuid};

/// Legacy all-zero ULID, treated the same as [`Uuid::nil`] when checking setters.
pub const LEGACY_NIL_ULID: &str = "00000000000000000000000000";

/// Produces unique, sortable identifiers.
pub trait IdGenerator: Send + Sync {
    /// A new identifier stamped with the current time.
    fn new_id(&self) -> Uuid;

    /// A new identifier stamped with `at`.
    fn new_id_from(&self, at: DateTime<Utc>) -> Uuid;
}

/// Default UUIDv7 generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn new_id(&self) -> Uuid {
        Uuid::now_v7()
    }

    fn new_id_from(&self, at: DateTime<Utc>) -> Uuid {
        let secs = at.timestamp().max(0) as u64;
        let nanos = at.timestamp_subsec_nanos();
        Uuid::new_v7(Timestamp::from_unix(NoContext, secs, nanos))
    }
}

/// True when a stored setter id means "not confirmed by a real actor".
pub fn is_sentinel_setter(setter: Option<&str>) -> bool {
    match setter {
        None => true,
        Some(s) => {
            let s = s.trim();
            s.is_empty() || s == LEGACY_NIL_ULID || Uuid::parse_str(s).is_ok_and(|u| u.is_nil())
        }
    }
}
