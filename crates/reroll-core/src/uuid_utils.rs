//! UUID v7 helpers for time-ordered identifiers.
//!
//! Search and request IDs are UUIDv7 so they sort chronologically in logs.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}
