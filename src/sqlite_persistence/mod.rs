mod versioned_schema;

pub use versioned_schema::{open_versioned, Column, SqlType, Table, VersionedSchema};

/// Offset added to schema versions stored in `PRAGMA user_version`, so a
/// database created by another tool is never mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 7000;
