//! Local fallback ledger store backed by a single JSON snapshot file.
//!
//! The whole ledger lives in memory behind one mutex. Every mutation is
//! applied to a copy, the copy is written to a fresh temp file and renamed
//! over the snapshot, and only then swapped in. A failed flush leaves both
//! the file and the in-memory state untouched.
//!
//! The flush and the swap run on their own task, so a caller that stops
//! waiting (a store timeout, a dropped request) cannot split them.

use crate::state::{LedgerState, Snapshot};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_core::ports::{LedgerStore, StoreBackend, Versioned, WriteOutcome};
use tally_core::{Account, Credits, Error, EventId, GrantRecord, Result, UserId, parse_date};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Snapshot file name inside the data directory.
pub const SNAPSHOT_FILE: &str = "ledger.json";
/// Flat `{userId: balance}` map written by older deployments.
pub const LEGACY_CREDITS_FILE: &str = "user_credits.json";
/// Flat `{userId: "YYYY-MM-DD"}` map written by older deployments.
pub const LEGACY_CLAIMS_FILE: &str = "daily_claims.json";

pub struct FileLedgerStore {
    path: PathBuf,
    state: Arc<Mutex<LedgerState>>,
}

impl FileLedgerStore {
    /// Open (or create) the store in `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| unavailable("create data dir", data_dir, e))?;

        let path = data_dir.join(SNAPSHOT_FILE);
        let state = if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| unavailable("stat snapshot", &path, e))?
        {
            LedgerState::from_snapshot(read_json(&path).await?)?
        } else {
            Self::import_legacy(data_dir).await?
        };

        info!(path = %path.display(), accounts = state.len(), "Opened file ledger store");
        Ok(Self {
            path,
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn import_legacy(data_dir: &Path) -> Result<LedgerState> {
        let credits_path = data_dir.join(LEGACY_CREDITS_FILE);
        let claims_path = data_dir.join(LEGACY_CLAIMS_FILE);

        let raw_credits: BTreeMap<String, serde_json::Value> =
            read_json_if_exists(&credits_path).await?;
        let raw_claims: BTreeMap<String, serde_json::Value> =
            read_json_if_exists(&claims_path).await?;

        // Older writers stored whatever the client sent. Keep what reads as a
        // whole credit count or a date and drop the rest.
        let mut credits = BTreeMap::new();
        for (user, value) in raw_credits {
            match legacy_balance(&value) {
                Some(balance) if UserId::new(user.as_str()).is_ok() => {
                    credits.insert(user, balance);
                }
                _ => warn!(user = %user, %value, "Skipping unreadable legacy balance"),
            }
        }
        let mut claims = BTreeMap::new();
        for (user, value) in raw_claims {
            match value.as_str().filter(|day| parse_date(day).is_ok()) {
                Some(day) if UserId::new(user.as_str()).is_ok() => {
                    claims.insert(user, day.to_string());
                }
                _ => warn!(user = %user, %value, "Skipping unreadable legacy claim date"),
            }
        }

        if !credits.is_empty() || !claims.is_empty() {
            info!(
                accounts = credits.len(),
                claims = claims.len(),
                "Importing legacy credit files"
            );
        }

        LedgerState::from_snapshot(Snapshot {
            credits,
            claims,
            grants: BTreeMap::new(),
        })
    }

    async fn mutate<F>(&self, apply: F) -> Result<WriteOutcome>
    where
        F: FnOnce(&mut LedgerState) -> WriteOutcome + Send,
    {
        let mut current = self.state.clone().lock_owned().await;
        let mut next = current.clone();
        let outcome = apply(&mut next);
        if !matches!(outcome, WriteOutcome::Committed { .. }) {
            return Ok(outcome);
        }

        let body = serde_json::to_vec_pretty(&next.to_snapshot())?;
        let path = self.path.clone();
        let commit = tokio::spawn(async move {
            let flushed = tokio::task::spawn_blocking({
                let path = path.clone();
                move || write_snapshot(&path, &body)
            })
            .await
            .map_err(|e| Error::Internal(format!("snapshot flush panicked: {e}")))?;
            flushed?;
            *current = next;
            debug!(path = %path.display(), "Flushed ledger snapshot");
            Ok::<_, Error>(())
        });

        commit
            .await
            .map_err(|e| Error::Internal(format!("snapshot commit task failed: {e}")))??;
        Ok(outcome)
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::File
    }

    async fn read(&self, user_id: &UserId) -> Result<Option<Versioned<Account>>> {
        Ok(self.state.lock().await.read(user_id))
    }

    async fn write(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
    ) -> Result<WriteOutcome> {
        self.mutate(|state| state.write(user_id, account, expected))
            .await
    }

    async fn find_grant(&self, event_id: &EventId) -> Result<Option<GrantRecord>> {
        Ok(self.state.lock().await.find_grant(event_id))
    }

    async fn write_with_grant(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
        grant: &GrantRecord,
    ) -> Result<WriteOutcome> {
        self.mutate(|state| state.write_with_grant(user_id, account, expected, grant))
            .await
    }

    async fn health_check(&self) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let metadata = tokio::fs::metadata(dir)
            .await
            .map_err(|e| unavailable("stat data dir", dir, e))?;
        if metadata.permissions().readonly() {
            return Err(Error::StoreUnavailable(format!(
                "data dir {} is read-only",
                dir.display()
            )));
        }
        Ok(())
    }
}

fn legacy_balance(value: &serde_json::Value) -> Option<Credits> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as Credits)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Write `body` to a uniquely named temp file next to `path`, then rename it
/// over `path`.
fn write_snapshot(path: &Path, body: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| unavailable("create temp snapshot", dir, e))?;
    tmp.write_all(body)
        .map_err(|e| unavailable("write temp snapshot", tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| unavailable("sync temp snapshot", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| unavailable("replace snapshot", path, e.error))?;
    Ok(())
}

fn unavailable(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::StoreUnavailable(format!("{action} {}: {err}", path.display()))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| unavailable("read", path, e))?;
    serde_json::from_slice(&raw)
        .map_err(|e| Error::CorruptRecord(format!("{}: {e}", path.display())))
}

async fn read_json_if_exists<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match tokio::fs::try_exists(path).await {
        Ok(true) => read_json(path).await,
        Ok(false) => Ok(T::default()),
        Err(e) => Err(unavailable("stat", path, e)),
    }
}
