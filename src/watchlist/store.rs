use super::WatchlistSource;
use solana_pubkey::Pubkey;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

pub const MAX_LABEL_LEN: usize = 10;

#[derive(Debug)]
pub enum WatchlistError {
    InvalidAddress(String),
    LabelTooLong(usize),
    AlreadyExists(String),
    NotFound(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for WatchlistError {
    fn from(err: std::io::Error) -> Self {
        WatchlistError::Io(err)
    }
}

impl From<serde_json::Error> for WatchlistError {
    fn from(err: serde_json::Error) -> Self {
        WatchlistError::Serialization(err)
    }
}

impl std::fmt::Display for WatchlistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchlistError::InvalidAddress(a) => write!(f, "Invalid solana address: {}", a),
            WatchlistError::LabelTooLong(len) => {
                write!(f, "Label is too long ({} > {} chars)", len, MAX_LABEL_LEN)
            }
            WatchlistError::AlreadyExists(a) => write!(f, "Address already watched: {}", a),
            WatchlistError::NotFound(a) => write!(f, "Address not watched: {}", a),
            WatchlistError::Io(e) => write!(f, "IO error: {}", e),
            WatchlistError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for WatchlistError {}

/// JSON file of `address -> label`, mirrored in memory.
///
/// Every successful mutation is written to disk before it becomes visible and
/// before subscribers are notified.
#[derive(Debug)]
pub struct WatchlistStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    notifier: watch::Sender<Vec<String>>,
}

impl WatchlistStore {
    /// Load `path`, creating an empty watchlist file if none exists yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WatchlistError> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            read_entries(&path)?
        } else {
            let empty = BTreeMap::new();
            write_entries(&path, &empty)?;
            log::info!("📝 Created empty watchlist at {}", path.display());
            empty
        };

        let (notifier, _) = watch::channel(entries.keys().cloned().collect());

        log::info!(
            "👀 Loaded {} watched address(es) from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            notifier,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_address(&self, address: &str, label: &str) -> Result<(), WatchlistError> {
        validate_address(address)?;

        let label_len = label.chars().count();
        if label_len > MAX_LABEL_LEN {
            return Err(WatchlistError::LabelTooLong(label_len));
        }

        let snapshot = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if entries.contains_key(address) {
                return Err(WatchlistError::AlreadyExists(address.to_string()));
            }

            let mut updated = entries.clone();
            updated.insert(address.to_string(), label.to_string());
            write_entries(&self.path, &updated)?;
            *entries = updated;
            entries.keys().cloned().collect::<Vec<_>>()
        };

        log::info!("➕ Watching {} ({})", address, label);
        self.notify(snapshot);
        Ok(())
    }

    pub fn remove_address(&self, address: &str) -> Result<(), WatchlistError> {
        validate_address(address)?;

        let snapshot = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if !entries.contains_key(address) {
                return Err(WatchlistError::NotFound(address.to_string()));
            }

            let mut updated = entries.clone();
            updated.remove(address);
            write_entries(&self.path, &updated)?;
            *entries = updated;
            entries.keys().cloned().collect::<Vec<_>>()
        };

        log::info!("➖ Stopped watching {}", address);
        self.notify(snapshot);
        Ok(())
    }

    /// Re-read the file and publish the new list if it was edited on disk.
    ///
    /// Returns whether anything changed. Entries with invalid addresses are
    /// skipped with a warning rather than failing the whole reload.
    pub fn reload(&self) -> Result<bool, WatchlistError> {
        let on_disk: BTreeMap<String, String> = read_entries(&self.path)?
            .into_iter()
            .filter(|(address, _)| match validate_address(address) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("⚠️  Ignoring watchlist entry: {}", e);
                    false
                }
            })
            .collect();

        let snapshot = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if *entries == on_disk {
                return Ok(false);
            }
            *entries = on_disk;
            entries.keys().cloned().collect::<Vec<_>>()
        };

        log::info!("🔄 Watchlist reloaded from disk ({} address(es))", snapshot.len());
        self.notify(snapshot);
        Ok(true)
    }

    fn notify(&self, snapshot: Vec<String>) {
        self.notifier.send_replace(snapshot);
    }
}

impl WatchlistSource for WatchlistStore {
    fn addresses(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.notifier.subscribe()
    }
}

fn validate_address(address: &str) -> Result<(), WatchlistError> {
    Pubkey::from_str(address)
        .map(|_| ())
        .map_err(|_| WatchlistError::InvalidAddress(address.to_string()))
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, String>, WatchlistError> {
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&data)?)
}

fn write_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), WatchlistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, serde_json::to_string_pretty(entries)?)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Periodically pick up edits made to the watchlist file by other processes.
///
/// Runs until cancelled.
pub async fn reload_task(store: Arc<WatchlistStore>, period: Duration) {
    log::info!(
        "⏰ Starting watchlist reload task (interval: {}s)",
        period.as_secs()
    );

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await;

    loop {
        timer.tick().await;

        if let Err(e) = store.reload() {
            log::error!("❌ Watchlist reload failed: {}", e);
        }
    }
}
