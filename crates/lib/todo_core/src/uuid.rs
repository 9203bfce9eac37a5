// Document ids for the in-memory backend.
//
// UUIDv7 ids sort in creation order.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a new UUIDv7 rendered as a document id.
pub fn document_id() -> String {
    uuidv7().simple().to_string()
}
