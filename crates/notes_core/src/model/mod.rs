//! Domain model for stored notes.
//!
//! # Invariants
//! - Every note is identified by a store-assigned `NoteId`.
//! - Deletion is a hard delete (explicit or by expiry); there are no tombstones.

pub mod note;
