//! `SQLite`-backed alert store.
//!
//! Appends are stamped with the database clock, never the caller's. Local
//! appends push a fresh snapshot to every subscriber immediately; commits from
//! other connections are picked up by polling `PRAGMA data_version`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::migrations;
use super::schema::{ALERT_COLUMNS, FEED_ORDER, SERVER_TIMESTAMP};
use super::{AlertStore, Snapshot, SnapshotSender, Subscription};
use crate::alert::{Alert, AlertId, Category, Coordinate, NewAlert};
use crate::error::{Error, Result};
use crate::identity::SessionToken;

/// Default interval between checks for commits made by other processes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Number of hex characters in a generated alert id.
const ID_LEN: usize = 20;

/// Alert store backed by a `SQLite` database.
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone)]
pub struct SqliteAlertStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    conn: Mutex<Connection>,
    subscribers: Mutex<Vec<SnapshotSender>>,
    session: Mutex<Option<SessionToken>>,
    require_session: bool,
    poll_interval: Duration,
    watcher: Mutex<Option<JoinHandle<()>>>,
    appended: AtomicU64,
}

/// Counts reported by [`SqliteAlertStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of alerts.
    pub total_alerts: i64,
    /// Alerts without a resolved timestamp.
    pub pending_alerts: i64,
    /// Alerts carrying a location.
    pub located_alerts: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

impl SqliteAlertStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening alert store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets watchers in other processes read while we write
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Alert store opened at {}", path.display());
        Ok(Self::from_connection(path, conn))
    }

    /// Create an in-memory store, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self::from_connection(PathBuf::from(":memory:"), conn))
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                conn: Mutex::new(conn),
                subscribers: Mutex::new(Vec::new()),
                session: Mutex::new(None),
                require_session: false,
                poll_interval: DEFAULT_POLL_INTERVAL,
                watcher: Mutex::new(None),
                appended: AtomicU64::new(0),
            }),
        }
    }

    /// Refuse reads and writes until a session is attached.
    ///
    /// Must be called before the store is shared.
    #[must_use]
    pub fn with_session_required(mut self, required: bool) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.require_session = required;
        }
        self
    }

    /// Set how often to look for commits from other connections.
    ///
    /// Must be called before the store is shared.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.poll_interval = interval;
        }
        self
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether a session has been attached.
    #[must_use]
    pub fn has_session(&self) -> bool {
        lock(&self.inner.session).is_ok_and(|s| s.is_some())
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).map_or(0, |mut subs| {
            subs.retain(|s| !s.is_closed());
            subs.len()
        })
    }

    /// Read the current ordered snapshot without subscribing.
    ///
    /// # Errors
    ///
    /// Returns an error if the session gate refuses the read or the query fails.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.inner.check_session("read")?;
        let conn = lock(&self.inner.conn)?;
        query_snapshot(&conn)
    }

    /// Insert a record that was created elsewhere, keeping its id and
    /// timestamp as-is. Existing ids are left untouched.
    ///
    /// Returns `true` if the record was new.
    ///
    /// # Errors
    ///
    /// Returns an error if the session gate refuses the write or the insert
    /// fails.
    pub fn import(&self, alert: &Alert) -> Result<bool> {
        self.inner.check_session("import")?;
        let inserted = {
            let conn = lock(&self.inner.conn)?;
            let affected = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO alerts ({ALERT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    alert.id.as_str(),
                    alert.description,
                    alert.category.as_str(),
                    alert.location.map(|c| c.lat),
                    alert.location.map(|c| c.lng),
                    alert.created_at.map(format_timestamp),
                ],
            )?;
            affected > 0
        };

        if inserted {
            debug!("Imported alert {}", alert.id);
            self.inner.publish_after_write();
        }
        Ok(inserted)
    }

    /// Get store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = lock(&self.inner.conn)?;
        let (total_alerts, pending_alerts, located_alerts) = conn.query_row(
            r"
            SELECT COUNT(*),
                   COALESCE(SUM(created_at IS NULL), 0),
                   COALESCE(SUM(latitude IS NOT NULL AND longitude IS NOT NULL), 0)
            FROM alerts
            ",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        let db_size_bytes = if self.inner.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.inner.path).map_or(0, |m| m.len())
        };

        Ok(StoreStats {
            total_alerts,
            pending_alerts,
            located_alerts,
            db_size_bytes,
        })
    }

    fn ensure_watcher(&self) -> Result<()> {
        let mut watcher = lock(&self.inner.watcher)?;
        if watcher.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let version = data_version(&*lock(&self.inner.conn)?)?;
        let weak = Arc::downgrade(&self.inner);
        *watcher = Some(tokio::spawn(watch_external_commits(
            weak,
            self.inner.poll_interval,
            version,
        )));
        Ok(())
    }
}

impl Inner {
    fn check_session(&self, operation: &'static str) -> Result<()> {
        if self.require_session && lock(&self.session)?.is_none() {
            return Err(Error::PermissionDenied { operation });
        }
        Ok(())
    }

    /// Push the current snapshot to every live subscriber.
    fn publish(&self) -> Result<()> {
        // Same lock order as subscribe: subscriber list, then connection.
        let mut subscribers = lock(&self.subscribers)?;
        let snapshot = query_snapshot(&*lock(&self.conn)?)?;
        subscribers.retain(|s| s.send(snapshot.clone()));
        trace!(
            "Pushed snapshot of {} alerts to {} subscribers",
            snapshot.len(),
            subscribers.len()
        );
        Ok(())
    }

    /// Publish after a committed write. The write stands either way, so a
    /// failed push is logged rather than reported to the writer.
    fn publish_after_write(&self) {
        if let Err(e) = self.publish() {
            warn!("Write committed but snapshot push failed: {}", e);
        }
    }

    fn has_subscribers(&self) -> bool {
        lock(&self.subscribers).is_ok_and(|mut subs| {
            subs.retain(|s| !s.is_closed());
            !subs.is_empty()
        })
    }
}

#[async_trait]
impl AlertStore for SqliteAlertStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn attach_session(&self, session: &SessionToken) -> Result<()> {
        *lock(&self.inner.session)? = Some(session.clone());
        debug!("Session attached to alert store");
        Ok(())
    }

    async fn subscribe_ordered(&self) -> Result<Subscription> {
        self.inner.check_session("subscribe")?;

        let (tx, subscription) = Subscription::channel();
        {
            // Hold the subscriber list while reading so no push can slip in
            // between the initial snapshot and registration.
            let mut subscribers = lock(&self.inner.subscribers)?;
            let snapshot = query_snapshot(&*lock(&self.inner.conn)?)?;
            tx.send(snapshot);
            subscribers.push(tx);
        }

        self.ensure_watcher()?;
        debug!("Opened alert subscription");
        Ok(subscription)
    }

    async fn append(&self, record: NewAlert) -> Result<AlertId> {
        self.inner.check_session("append")?;
        if record.description.is_empty() || !record.location.is_finite() {
            return Err(Error::append("alert needs a description and a location"));
        }

        let serial = self.inner.appended.fetch_add(1, Ordering::Relaxed);
        let id = generate_id(&record, serial);

        {
            let conn = lock(&self.inner.conn)?;
            conn.execute(
                &format!(
                    "INSERT INTO alerts ({ALERT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, {SERVER_TIMESTAMP})"
                ),
                params![
                    id.as_str(),
                    record.description,
                    record.category.as_str(),
                    record.location.lat,
                    record.location.lng,
                ],
            )
            .map_err(|e| Error::append(e.to_string()))?;
        }

        info!("Appended {} alert {}", record.category, id);
        self.inner.publish_after_write();
        Ok(id)
    }
}

/// Poll for commits from other connections while anyone is subscribed.
async fn watch_external_commits(store: Weak<Inner>, interval: Duration, mut version: i64) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(inner) = store.upgrade() else {
            return;
        };
        if !inner.has_subscribers() {
            trace!("No subscribers left, stopping commit watcher");
            return;
        }

        let current = match lock(&inner.conn).and_then(|conn| data_version(&conn)) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to check alert store for changes: {}", e);
                continue;
            }
        };

        if current != version {
            version = current;
            debug!("Alert store changed by another connection");
            if let Err(e) = inner.publish() {
                warn!("Failed to push snapshot: {}", e);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::internal("alert store lock poisoned"))
}

/// Render a timestamp the way the server clock writes it, so text ordering
/// matches time ordering.
fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn data_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

fn query_snapshot(conn: &Connection) -> Result<Snapshot> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY {FEED_ORDER}"
    ))?;
    let alerts = stmt
        .query_map([], row_to_alert)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(alerts)
}

/// Derive an opaque id from the record, the clock and a per-store counter.
fn generate_id(record: &NewAlert, serial: u64) -> AlertId {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(record.description.as_bytes());
    hasher.update(record.category.as_str().as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&serial.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());

    let hex = hasher.finalize().to_hex();
    AlertId::new(&hex.as_str()[..ID_LEN])
}

/// Read a nullable REAL column. Values of another type read as absent.
fn real_column(row: &rusqlite::Row, idx: usize, id: &str) -> rusqlite::Result<Option<f64>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        value => Ok(value.as_f64().ok().or_else(|| {
            warn!("Unreadable coordinate on alert {}, ignoring location", id);
            None
        })),
    }
}

/// Convert a database row to an Alert.
fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
    let id: String = row.get(0)?;
    let description: String = row.get(1)?;
    let category_str: String = row.get(2)?;
    let latitude = real_column(row, 3, &id)?;
    let longitude = real_column(row, 4, &id)?;
    let created_at_str = match row.get_ref(5)? {
        ValueRef::Null => None,
        value => value.as_str().ok().map(str::to_owned).or_else(|| {
            warn!("Non-text timestamp on alert {}, treating as pending", id);
            None
        }),
    };

    let category = category_str.parse().unwrap_or_else(|_| {
        warn!(
            "Unknown alert category: {}, defaulting to other",
            category_str
        );
        Category::Other
    });

    let location = match (latitude, longitude) {
        (Some(lat), Some(lng)) => Coordinate::new(lat, lng),
        _ => None,
    };

    let created_at = created_at_str.and_then(|s| match DateTime::parse_from_rfc3339(&s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => {
            warn!("Unreadable timestamp {:?} on alert {}, treating as pending", s, id);
            None
        }
    });

    Ok(Alert {
        id: AlertId::new(id),
        description,
        category,
        location,
        created_at,
    })
}
