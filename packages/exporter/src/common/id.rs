//! Identifier helpers.

use uuid::Uuid;

/// Generate a time-ordered id for new database rows.
pub fn db_id() -> Uuid {
    Uuid::now_v7()
}
