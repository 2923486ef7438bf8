//! Album/asset schema discovery.
//!
//! Newer library releases renamed `albums` to `album`, `albums_assets_assets`
//! to `album_asset`, `albumsId` to `albumId`, and so on. Table and foreign-key
//! discovery is strict: if it cannot be determined the run fails. Column
//! variants (album name, asset path) fall back to the common default.

use anyhow::Result;
use thiserror::Error;
use tracing::info;

use super::Catalog;

/// Singular first: newer schemas use singular names.
const ALBUM_TABLES: &[&str] = &["album", "albums"];
const ASSET_TABLES: &[&str] = &["asset", "assets"];
const JOIN_TABLES: &[&str] = &[
    "album_asset",
    "album_assets",
    "albums_assets",
    "albums_assets_assets",
    "album_assets_asset",
];
const ALBUM_FK_COLUMNS: &[&str] = &["albumId", "albumsId"];
const ASSET_FK_COLUMNS: &[&str] = &["assetId", "assetsId"];
/// `albumName` is the older name; newer releases use `name`.
const ALBUM_NAME_COLUMNS: &[&str] = &["albumName", "name", "title"];
const DEFAULT_ALBUM_NAME_COLUMN: &str = "name";
const OWNER_COLUMN: &str = "ownerId";
const ASSET_PATH_COLUMNS: &[&str] = &[
    "originalPath",
    "original_path",
    "originalFilePath",
    "fileOriginalPath",
];
const DEFAULT_ASSET_PATH_COLUMN: &str = "originalPath";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Could not find album/asset tables in schema 'public'")]
    MissingTables,

    #[error("Could not find album-asset join table in schema 'public'")]
    MissingJoinTable,

    #[error("Join table '{0}' missing album/asset FK columns")]
    MissingForeignKeys(String),

    #[error("Refusing to use identifier {0:?} in a query")]
    UnsafeIdentifier(String),
}

/// Table and column names to use for the album/asset query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    pub albums_table: String,
    pub assets_table: String,
    pub join_table: String,
    pub album_fk: String,
    pub asset_fk: String,
    pub album_name_col: String,
    pub owner_col: Option<String>,
    pub asset_path_col: String,
}

impl ResolvedSchema {
    /// Build the album/asset query. With `owner_filter`, the owner id is bind parameter `$1`.
    ///
    /// Identifiers are interpolated (SQL has no bind parameters for them), so each is
    /// re-checked here; only values ever travel as parameters.
    pub fn query(&self, owner_filter: bool) -> Result<String, SchemaError> {
        let albums = quote_ident(&self.albums_table)?;
        let assets = quote_ident(&self.assets_table)?;
        let join = quote_ident(&self.join_table)?;
        let album_fk = quote_ident(&self.album_fk)?;
        let asset_fk = quote_ident(&self.asset_fk)?;
        let name = quote_ident(&self.album_name_col)?;
        let path = quote_ident(&self.asset_path_col)?;

        let filter = match (&self.owner_col, owner_filter) {
            (Some(owner), true) => format!("WHERE a.{}::text = $1", quote_ident(owner)?),
            _ => String::new(),
        };

        Ok(format!(
            r#"
            SELECT a.id::text, a.{name}::text, s.{path}::text
            FROM {albums} a
            JOIN {join} aa ON a.id = aa.{album_fk}
            JOIN {assets} s ON aa.{asset_fk} = s.id
            {filter}
            ORDER BY a.{name}, s.{path}
            "#
        ))
    }
}

/// Inspect the catalog and decide which tables and columns hold albums and assets.
pub fn resolve_schema<C: Catalog + ?Sized>(catalog: &mut C) -> Result<ResolvedSchema> {
    let albums_table = first_existing_table(catalog, ALBUM_TABLES)?;
    let assets_table = first_existing_table(catalog, ASSET_TABLES)?;
    let (albums_table, assets_table) = match (albums_table, assets_table) {
        (Some(albums), Some(assets)) => (albums, assets),
        _ => return Err(SchemaError::MissingTables.into()),
    };

    let join_table = match first_existing_table(catalog, JOIN_TABLES)? {
        Some(table) => table,
        None => catalog
            .tables_matching("album", "asset")?
            .into_iter()
            .next()
            .ok_or(SchemaError::MissingJoinTable)?,
    };
    check_ident(&join_table)?;

    let join_cols = catalog.columns(&join_table)?;
    let album_fk = first_in(ALBUM_FK_COLUMNS, &join_cols);
    let asset_fk = first_in(ASSET_FK_COLUMNS, &join_cols);
    let (album_fk, asset_fk) = match (album_fk, asset_fk) {
        (Some(album), Some(asset)) => (album, asset),
        _ => return Err(SchemaError::MissingForeignKeys(join_table).into()),
    };

    let album_cols = catalog.columns(&albums_table)?;
    let album_name_col = first_in(ALBUM_NAME_COLUMNS, &album_cols)
        .unwrap_or_else(|| DEFAULT_ALBUM_NAME_COLUMN.to_string());
    let owner_col = album_cols
        .contains(OWNER_COLUMN)
        .then(|| OWNER_COLUMN.to_string());

    let asset_cols = catalog.columns(&assets_table)?;
    let asset_path_col = first_in(ASSET_PATH_COLUMNS, &asset_cols)
        .unwrap_or_else(|| DEFAULT_ASSET_PATH_COLUMN.to_string());

    info!(
        "Using tables: {}, {}, join {} ({}->{})",
        albums_table, assets_table, join_table, album_fk, asset_fk
    );

    Ok(ResolvedSchema {
        albums_table,
        assets_table,
        join_table,
        album_fk,
        asset_fk,
        album_name_col,
        owner_col,
        asset_path_col,
    })
}

fn first_existing_table<C: Catalog + ?Sized>(
    catalog: &mut C,
    names: &[&str],
) -> Result<Option<String>> {
    for name in names {
        if catalog.table_exists(name)? {
            return Ok(Some(name.to_string()));
        }
    }
    Ok(None)
}

fn first_in(options: &[&str], available: &std::collections::HashSet<String>) -> Option<String> {
    options
        .iter()
        .find(|option| available.contains(**option))
        .map(|option| option.to_string())
}

/// Catalog names are trusted only if they look like plain identifiers.
fn check_ident(ident: &str) -> Result<(), SchemaError> {
    let plain = !ident.is_empty()
        && ident.len() <= 63
        && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Ok(())
    } else {
        Err(SchemaError::UnsafeIdentifier(ident.to_string()))
    }
}

fn quote_ident(ident: &str) -> Result<String, SchemaError> {
    check_ident(ident)?;
    Ok(format!("\"{}\"", ident))
}
