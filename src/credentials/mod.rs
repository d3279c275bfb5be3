//! Credential persistence.
//!
//! Drivers keep their authentication material in a volatile directory
//! tree. This module copies that tree into a durable store partitioned by
//! session name, reads it back as a [`CredentialSnapshot`], and restores it
//! before a driver starts. Per-file failures are reported in the result
//! rather than aborting the whole operation.

mod snapshot;
mod store;

pub use snapshot::{
    CredentialEntry, CredentialSnapshot, PersistError, SaveOutcome, DEFAULT_INLINE_LIMIT,
};
pub use store::CredentialStore;
