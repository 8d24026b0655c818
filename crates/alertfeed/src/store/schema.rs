//! `SQLite` schema definitions for the alert store.

/// SQL statement to create the alerts table.
///
/// `created_at` and the coordinates are nullable: records imported from
/// elsewhere may lack a resolved timestamp or a location.
pub const CREATE_ALERTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    latitude REAL,
    longitude REAL,
    created_at TEXT
)
";

/// SQL statement to create an index backing the feed ordering.
pub const CREATE_CREATED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ALERTS_TABLE,
    CREATE_CREATED_AT_INDEX,
    CREATE_METADATA_TABLE,
];

/// Select list shared by every alert query.
pub const ALERT_COLUMNS: &str = "id, description, category, latitude, longitude, created_at";

/// Feed ordering: pending first, then newest first, then latest insert first.
pub const FEED_ORDER: &str = "created_at IS NULL DESC, created_at DESC, rowid DESC";

/// Server-side clock expression used to stamp new alerts.
pub const SERVER_TIMESTAMP: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_create_alerts_table_contains_required_columns() {
        assert!(CREATE_ALERTS_TABLE.contains("id TEXT PRIMARY KEY"));
        assert!(CREATE_ALERTS_TABLE.contains("description TEXT NOT NULL"));
        assert!(CREATE_ALERTS_TABLE.contains("category TEXT NOT NULL"));
        assert!(CREATE_ALERTS_TABLE.contains("created_at TEXT\n"));
    }

    #[test]
    fn test_feed_order_puts_pending_first() {
        assert!(FEED_ORDER.starts_with("created_at IS NULL DESC"));
    }
}
