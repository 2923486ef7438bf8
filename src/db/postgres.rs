//! PostgreSQL connection, catalog lookups and the album/asset query.

use anyhow::{Context, Result};
use postgres::{Client, NoTls};
use std::collections::HashSet;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use super::schema::ResolvedSchema;
use super::{AlbumAssetRow, Catalog};
use crate::config::DatabaseConfig;

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(6))
}

/// Connect and check the database, retrying with exponential backoff.
pub fn connect(config: &DatabaseConfig) -> Result<Client> {
    let mut pg = postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .dbname(&config.name)
        .user(&config.user)
        .password(config.password.as_str())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

    let attempts = config.connect_retries.max(1);
    let mut attempt = 1;

    loop {
        info!(
            "Connecting to database {}:{} (attempt {}/{})",
            config.host, config.port, attempt, attempts
        );

        match pg.connect(NoTls) {
            Ok(mut client) => {
                client
                    .batch_execute("SET search_path TO public; SELECT 1;")
                    .context("Database check failed")?;
                info!("DB OK");
                return Ok(client);
            }
            Err(e) if attempt < attempts => {
                let delay = backoff_delay(attempt);
                warn!("Database connection failed: {}; retrying in {:?}", e, delay);
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "Failed to connect to database {}:{} after {} attempt(s)",
                        config.host, config.port, attempts
                    )
                });
            }
        }
    }
}

impl Catalog for Client {
    fn table_exists(&mut self, name: &str) -> Result<bool> {
        let row = self.query_one(
            "SELECT to_regclass($1)::text",
            &[&format!("public.{}", name)],
        )?;
        let found: Option<String> = row.get(0);
        Ok(found.is_some())
    }

    fn columns(&mut self, table: &str) -> Result<HashSet<String>> {
        let rows = self.query(
            r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            "#,
            &[&table],
        )?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    fn tables_matching(&mut self, first: &str, second: &str) -> Result<Vec<String>> {
        let first = format!("%{}%", first);
        let second = format!("%{}%", second);
        let rows = self.query(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public'
              AND table_name ILIKE $1
              AND table_name ILIKE $2
            ORDER BY table_name
            "#,
            &[&first, &second],
        )?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

/// Run the resolved album/asset query, optionally restricted to one owner.
pub fn fetch_album_assets(
    client: &mut Client,
    schema: &ResolvedSchema,
    user_id: Option<&str>,
) -> Result<Vec<AlbumAssetRow>> {
    let owner = user_id.filter(|_| schema.owner_col.is_some());
    let sql = schema.query(owner.is_some())?;

    let rows = match owner {
        Some(owner) => client.query(sql.as_str(), &[&owner]),
        None => client.query(sql.as_str(), &[]),
    }
    .context("Album/asset query failed")?;

    let rows = rows
        .iter()
        .map(|row| {
            let album_id: Option<String> = row.get(0);
            let album_name: Option<String> = row.get(1);
            let original_path: Option<String> = row.get(2);
            AlbumAssetRow {
                album_id: album_id.unwrap_or_default(),
                album_name: album_name.unwrap_or_default(),
                original_path: original_path.unwrap_or_default(),
            }
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(50), Duration::from_secs(64));
    }
}
