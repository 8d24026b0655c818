//! Schema versioning for the alert store.
//!
//! The on-disk version lives under `schema_version` in the `metadata` table.
//! Steps in [`MIGRATIONS`] run in order, each in its own transaction, starting
//! after whatever version the file already has.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// Key holding the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

type Step = fn(&Connection) -> Result<()>;

/// Ordered migration steps. Step `i` brings the schema to version `i + 1`.
const MIGRATIONS: &[Step] = &[create_base_schema, rename_legacy_categories];

/// The schema version a freshly initialized store ends up at.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the database up to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if the stored version is unreadable or newer than this
/// build, or if a step fails. A failed step is rolled back.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
    )?;

    let on_disk = stored_version(conn)?;
    if on_disk > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema v{on_disk} is newer than supported v{CURRENT_VERSION}"
            ),
        });
    }

    for (index, step) in MIGRATIONS.iter().enumerate().skip(version_index(on_disk)) {
        let target = i32::try_from(index + 1).map_err(|_| Error::DatabaseMigration {
            message: "too many migrations".to_string(),
        })?;

        let tx = conn.unchecked_transaction()?;
        step(&tx)?;
        store_version(&tx, target)?;
        tx.commit()?;
        debug!("Alert store schema migrated to v{}", target);
    }

    if on_disk < CURRENT_VERSION && on_disk > 0 {
        info!(
            "Upgraded alert store schema from v{} to v{}",
            on_disk, CURRENT_VERSION
        );
    }
    Ok(())
}

fn version_index(version: i32) -> usize {
    usize::try_from(version).unwrap_or(0)
}

/// Read the stored version; 0 for a fresh database.
fn stored_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn store_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

/// v1: the alerts table and its ordering index.
fn create_base_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute_batch(statement)?;
    }
    Ok(())
}

/// v2: early builds wrote `strike` and `load_shedding` as category names.
fn rename_legacy_categories(conn: &Connection) -> Result<()> {
    let renamed = conn.execute(
        r"
        UPDATE alerts
        SET category = CASE category
            WHEN 'strike' THEN 'strike_unrest'
            WHEN 'load_shedding' THEN 'loadshedding'
        END
        WHERE category IN ('strike', 'load_shedding')
        ",
        [],
    )?;
    if renamed > 0 {
        debug!("Renamed category on {} legacy alerts", renamed);
    }
    Ok(())
}
