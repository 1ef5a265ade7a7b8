//!
//! cake store module
//! ----------------
//! File-backed store for the session bridge. Each table is one JSON document
//! under a configurable root folder: `sessions.json` and `profiles.json` hold
//! the legacy remora side (seeded out of band via fixtures), `users.json`
//! holds cake-side user records written by the authentication backend, and
//! `stats.json` holds the global site statistics the home page renders.
//!
//! Key responsibilities:
//! - Explicit repository surface with find/delete per table; absence is
//!   `None`, never an error.
//! - Read-then-conditional-delete pruning of failed sessions.
//! - Fixture loading for seed datasets, from a single file or a directory
//!   walk.
//!
//! The public API centers around the `Store` type, which is wrapped in a
//! thread-safe `SharedStore` (`Arc<Mutex<Store>>`) by the server.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::{Session, User, UserProfile};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store decode: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Global site statistics, unrelated to authentication but required by the
/// home page. Seeded from its own fixture dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteStats {
    #[serde(default)]
    pub addon_count: i64,
    #[serde(default)]
    pub download_count: i64,
    #[serde(default)]
    pub user_count: i64,
}

/// One seed dataset: any subset of the backing tables. Loading a fixture
/// replaces rows that share a key with fixture rows, so loads are idempotent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub profiles: Vec<UserProfile>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub stats: Option<SiteStats>,
}

/// Core on-disk storage handle rooted at a filesystem directory.
#[derive(Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Create a new Store rooted at the given filesystem path.
    /// The directory is created if it does not already exist.
    pub fn new<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Return the configured root folder for this Store.
    pub fn root_path(&self) -> &PathBuf { &self.root }

    fn sessions_path(&self) -> PathBuf { self.root.join("sessions.json") }
    fn profiles_path(&self) -> PathBuf { self.root.join("profiles.json") }
    fn users_path(&self) -> PathBuf { self.root.join("users.json") }
    fn stats_path(&self) -> PathBuf { self.root.join("stats.json") }

    fn read_table<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> StoreResult<()> {
        if let Some(dir) = path.parent() { fs::create_dir_all(dir).ok(); }
        let raw = serde_json::to_string_pretty(rows)?;
        fs::write(path, raw)?;
        Ok(())
    }

    // --- sessions (legacy side: read and prune only) ---

    pub fn find_session(&self, token: &str) -> StoreResult<Option<Session>> {
        let rows: Vec<Session> = Self::read_table(&self.sessions_path())?;
        Ok(rows.into_iter().find(|s| s.token == token))
    }

    /// Remove a session row. Returns whether a row was actually removed.
    pub fn delete_session(&self, token: &str) -> StoreResult<bool> {
        let rows: Vec<Session> = Self::read_table(&self.sessions_path())?;
        let before = rows.len();
        let kept: Vec<Session> = rows.into_iter().filter(|s| s.token != token).collect();
        let removed = kept.len() != before;
        if removed {
            Self::write_table(&self.sessions_path(), &kept)?;
            debug!(target: "cake::store", "delete_session: removed token='{}'", token);
        }
        Ok(removed)
    }

    // --- profiles (legacy side: read only) ---

    pub fn find_profile(&self, id: i64) -> StoreResult<Option<UserProfile>> {
        let rows: Vec<UserProfile> = Self::read_table(&self.profiles_path())?;
        Ok(rows.into_iter().find(|p| p.id == id))
    }

    // --- users (cake side) ---

    pub fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        let rows: Vec<User> = Self::read_table(&self.users_path())?;
        Ok(rows.into_iter().find(|u| u.id == id))
    }

    /// Insert or replace a cake-side user record keyed by id.
    pub fn upsert_user(&self, user: &User) -> StoreResult<()> {
        let mut rows: Vec<User> = Self::read_table(&self.users_path())?;
        rows.retain(|u| u.id != user.id);
        rows.push(user.clone());
        Self::write_table(&self.users_path(), &rows)
    }

    // --- site stats ---

    pub fn global_stats(&self) -> StoreResult<SiteStats> {
        let path = self.stats_path();
        if !path.exists() {
            return Ok(SiteStats::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn set_global_stats(&self, stats: &SiteStats) -> StoreResult<()> {
        let raw = serde_json::to_string_pretty(stats)?;
        fs::write(self.stats_path(), raw)?;
        Ok(())
    }

    /// True when nothing has ever been written under this root.
    pub fn is_empty(&self) -> bool {
        !self.sessions_path().exists()
            && !self.profiles_path().exists()
            && !self.users_path().exists()
            && !self.stats_path().exists()
    }

    /// Row counts per table, for the startup inventory log.
    pub fn table_counts(&self) -> StoreResult<(usize, usize, usize)> {
        let sessions: Vec<Session> = Self::read_table(&self.sessions_path())?;
        let profiles: Vec<UserProfile> = Self::read_table(&self.profiles_path())?;
        let users: Vec<User> = Self::read_table(&self.users_path())?;
        Ok((sessions.len(), profiles.len(), users.len()))
    }

    // --- fixtures ---

    /// Apply one parsed fixture document to the backing tables.
    pub fn apply_fixture(&self, fx: Fixture) -> StoreResult<()> {
        if !fx.sessions.is_empty() {
            let mut rows: Vec<Session> = Self::read_table(&self.sessions_path())?;
            for s in fx.sessions {
                rows.retain(|r| r.token != s.token);
                rows.push(s);
            }
            Self::write_table(&self.sessions_path(), &rows)?;
        }
        if !fx.profiles.is_empty() {
            let mut rows: Vec<UserProfile> = Self::read_table(&self.profiles_path())?;
            for p in fx.profiles {
                rows.retain(|r| r.id != p.id);
                rows.push(p);
            }
            Self::write_table(&self.profiles_path(), &rows)?;
        }
        if !fx.users.is_empty() {
            let mut rows: Vec<User> = Self::read_table(&self.users_path())?;
            for u in fx.users {
                rows.retain(|r| r.id != u.id);
                rows.push(u);
            }
            Self::write_table(&self.users_path(), &rows)?;
        }
        if let Some(stats) = fx.stats {
            self.set_global_stats(&stats)?;
        }
        Ok(())
    }

    /// Load one fixture file.
    pub fn load_fixture<P: AsRef<Path>>(&self, path: P) -> StoreResult<()> {
        let raw = fs::read_to_string(path.as_ref())?;
        let fx: Fixture = serde_json::from_str(&raw)?;
        debug!(target: "cake::store", "load_fixture: applying '{}'", path.as_ref().display());
        self.apply_fixture(fx)
    }

    /// Walk a directory and load every `.json` fixture beneath it, in file
    /// name order. Returns the number of fixture files applied.
    pub fn load_fixture_dir<P: AsRef<Path>>(&self, dir: P) -> StoreResult<usize> {
        let mut loaded = 0usize;
        for entry in walkdir::WalkDir::new(dir.as_ref()).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            let is_json = entry.path().extension().map(|e| e == "json").unwrap_or(false);
            if entry.file_type().is_file() && is_json {
                self.load_fixture(entry.path())?;
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

/// Thread-safe handle shared across request handlers.
#[derive(Clone)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn new<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        Ok(Self(Arc::new(Mutex::new(Store::new(root)?))))
    }

    pub fn root_path(&self) -> PathBuf {
        self.0.lock().root.clone()
    }

    pub fn find_session(&self, token: &str) -> StoreResult<Option<Session>> {
        self.0.lock().find_session(token)
    }

    pub fn delete_session(&self, token: &str) -> StoreResult<bool> {
        self.0.lock().delete_session(token)
    }

    pub fn find_profile(&self, id: i64) -> StoreResult<Option<UserProfile>> {
        self.0.lock().find_profile(id)
    }

    pub fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        self.0.lock().find_user(id)
    }

    pub fn upsert_user(&self, user: &User) -> StoreResult<()> {
        self.0.lock().upsert_user(user)
    }

    pub fn global_stats(&self) -> StoreResult<SiteStats> {
        self.0.lock().global_stats()
    }

    pub fn set_global_stats(&self, stats: &SiteStats) -> StoreResult<()> {
        self.0.lock().set_global_stats(stats)
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn table_counts(&self) -> StoreResult<(usize, usize, usize)> {
        self.0.lock().table_counts()
    }

    pub fn apply_fixture(&self, fx: Fixture) -> StoreResult<()> {
        self.0.lock().apply_fixture(fx)
    }

    pub fn load_fixture<P: AsRef<Path>>(&self, path: P) -> StoreResult<()> {
        self.0.lock().load_fixture(path)
    }

    pub fn load_fixture_dir<P: AsRef<Path>>(&self, dir: P) -> StoreResult<usize> {
        self.0.lock().load_fixture_dir(dir)
    }
}
