//! Read-only access to the photo library's database.
//!
//! The library's schema has drifted across releases (singular vs plural
//! table names, renamed columns), so nothing here hard-codes it: the
//! [`schema`] resolver inspects a [`Catalog`] and hands back the names to use.

pub mod postgres;
pub mod schema;

use anyhow::Result;
use std::collections::HashSet;

pub use self::postgres::{connect, fetch_album_assets};
pub use schema::{resolve_schema, ResolvedSchema, SchemaError};

/// One album membership of one asset. An asset in two albums yields two rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumAssetRow {
    pub album_id: String,
    pub album_name: String,
    pub original_path: String,
}

impl AlbumAssetRow {
    pub fn new(
        album_id: impl Into<String>,
        album_name: impl Into<String>,
        original_path: impl Into<String>,
    ) -> Self {
        Self {
            album_id: album_id.into(),
            album_name: album_name.into(),
            original_path: original_path.into(),
        }
    }
}

/// Schema introspection needed by the resolver.
///
/// Only the `public` schema is consulted.
pub trait Catalog {
    /// Whether a table with exactly this name exists.
    fn table_exists(&mut self, name: &str) -> Result<bool>;

    /// Column names of a table (empty if the table is unknown).
    fn columns(&mut self, table: &str) -> Result<HashSet<String>>;

    /// Tables whose name contains both substrings, case-insensitively, sorted by name.
    fn tables_matching(&mut self, first: &str, second: &str) -> Result<Vec<String>>;
}
