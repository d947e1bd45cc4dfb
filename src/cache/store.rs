use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;
use parking_lot::{Condvar, Mutex};

use crate::foundation::core::unix_now_secs;
use crate::foundation::error::{MatflowError, MatflowResult};
use crate::foundation::fs::{dir_size, ensure_dir};
use crate::job::fingerprint::Fingerprint;

/// Per-entry metadata file written next to the committed outputs.
pub const META_FILE: &str = "meta.json";
const STAGING_DIR: &str = ".staging";

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct EntryMeta {
    fingerprint: Fingerprint,
    size_bytes: u64,
    created_secs: u64,
}

#[derive(Debug)]
struct Slot {
    dir: PathBuf,
    size_bytes: u64,
    created_secs: u64,
    last_access: u64,
    refs: u32,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<Fingerprint, Slot>,
    in_flight: HashSet<Fingerprint>,
    total_bytes: u64,
    tick: u64,
}

impl State {
    fn touch(&mut self, fp: Fingerprint) -> Option<&mut Slot> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&fp).map(|s| {
            s.last_access = tick;
            s
        })
    }

    fn remove(&mut self, fp: Fingerprint) -> Option<Slot> {
        let slot = self.entries.remove(&fp)?;
        self.total_bytes = self.total_bytes.saturating_sub(slot.size_bytes);
        Some(slot)
    }
}

/// Snapshot of one cache entry.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CacheEntryInfo {
    /// Key of the entry.
    pub fingerprint: Fingerprint,
    /// Directory holding the entry's files.
    pub dir: PathBuf,
    /// Bytes counted against the budget.
    pub size_bytes: u64,
    /// Commit time in seconds since the Unix epoch.
    pub created_secs: u64,
    /// Live leases on the entry.
    pub refs: u32,
}

/// Snapshot of the store's occupancy.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Store directory.
    pub root: PathBuf,
    /// Committed entries.
    pub entries: usize,
    /// Bytes of all committed entries.
    pub total_bytes: u64,
    /// Size budget in bytes.
    pub budget_bytes: u64,
    /// Fingerprints currently being produced.
    pub in_flight: usize,
}

/// Outcome of [`CacheStore::reserve`].
#[derive(Debug)]
pub enum Reservation<'a> {
    /// A committed entry existed.
    Hit(CacheLease<'a>),
    /// Another worker was producing this fingerprint; it committed while we waited.
    WaitThenHit(CacheLease<'a>),
    /// The caller owns the fingerprint and must produce it.
    MustExecute(CacheTicket<'a>),
}

/// Fingerprint-keyed output store with at-most-one producer per fingerprint and LRU
/// eviction of unreferenced entries.
///
/// Layout: `<root>/<fingerprint>/` holds the outputs plus [`META_FILE`]; producers write into
/// `<root>/.staging/` and are renamed into place on commit.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    budget_bytes: u64,
    state: Mutex<State>,
    changed: Condvar,
    staging_seq: AtomicU64,
}

impl CacheStore {
    /// Open (or create) a store at `root`, rebuilding entries from their metadata.
    ///
    /// Leftover staging directories and entries with missing or corrupt metadata are removed.
    pub fn open(root: impl Into<PathBuf>, budget_bytes: u64) -> MatflowResult<Self> {
        let root = root.into();
        ensure_dir(&root)?;
        let staging = root.join(STAGING_DIR);
        if staging.exists() {
            std::fs::remove_dir_all(&staging).with_context(|| {
                format!("failed to clear staging directory '{}'", staging.display())
            })?;
        }

        let mut found = Vec::new();
        let listing = std::fs::read_dir(&root)
            .with_context(|| format!("failed to read cache directory '{}'", root.display()))?;
        for dirent in listing {
            let dirent = dirent.context("failed to read cache directory entry")?;
            let dir = dirent.path();
            if !dir.is_dir() {
                continue;
            }
            let Some(fp) = dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<Fingerprint>().ok())
            else {
                continue;
            };
            match read_meta(&dir) {
                Some(meta) if meta.fingerprint == fp => found.push((dir, meta)),
                _ => {
                    tracing::warn!(dir = %dir.display(), "discarding corrupt cache entry");
                    if let Err(e) = std::fs::remove_dir_all(&dir) {
                        tracing::warn!(dir = %dir.display(), error = %e, "failed to remove corrupt cache entry");
                    }
                }
            }
        }

        // Oldest first, so that creation order seeds the LRU order.
        found.sort_by_key(|(_, m)| (m.created_secs, m.fingerprint));
        let mut state = State::default();
        for (dir, meta) in found {
            state.tick += 1;
            state.total_bytes += meta.size_bytes;
            state.entries.insert(
                meta.fingerprint,
                Slot {
                    dir,
                    size_bytes: meta.size_bytes,
                    created_secs: meta.created_secs,
                    last_access: state.tick,
                    refs: 0,
                },
            );
        }

        let store = Self {
            root,
            budget_bytes,
            state: Mutex::new(state),
            changed: Condvar::new(),
            staging_seq: AtomicU64::new(0),
        };
        {
            let mut st = store.state.lock();
            store.evict_locked(&mut st);
            tracing::debug!(
                root = %store.root.display(),
                entries = st.entries.len(),
                total_bytes = st.total_bytes,
                "opened cache"
            );
        }
        Ok(store)
    }

    /// Store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Size budget in bytes.
    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Claim `fp`: reuse a committed entry, wait for an in-flight producer, or become the
    /// producer.
    ///
    /// Blocks while another ticket for `fp` is outstanding. If that producer releases without
    /// committing, one waiter becomes the new producer.
    pub fn reserve(&self, fp: Fingerprint) -> MatflowResult<Reservation<'_>> {
        let mut waited = false;
        let mut st = self.state.lock();
        loop {
            let present = st.touch(fp).map(|slot| (slot.dir.clone(), slot.dir.is_dir()));
            match present {
                Some((dir, true)) => {
                    if let Some(slot) = st.entries.get_mut(&fp) {
                        slot.refs += 1;
                    }
                    tracing::debug!(fingerprint = %fp, waited, "cache hit");
                    let lease = CacheLease {
                        store: self,
                        fp,
                        dir,
                    };
                    return Ok(if waited {
                        Reservation::WaitThenHit(lease)
                    } else {
                        Reservation::Hit(lease)
                    });
                }
                Some((dir, false)) => {
                    tracing::warn!(fingerprint = %fp, dir = %dir.display(), "cache entry vanished; treating as miss");
                    st.remove(fp);
                }
                None => {}
            }

            if st.in_flight.insert(fp) {
                break;
            }
            waited = true;
            self.changed.wait(&mut st);
        }
        drop(st);

        let seq = self.staging_seq.fetch_add(1, Ordering::Relaxed);
        let staging = self.root.join(STAGING_DIR).join(format!("{fp}-{seq}"));
        let ticket = CacheTicket {
            store: self,
            fp,
            staging,
            done: false,
        };
        // On failure the ticket drops here and frees the slot.
        ensure_dir(&ticket.staging)
            .map_err(|e| MatflowError::cache(format!("failed to create staging dir: {e}")))?;
        tracing::debug!(fingerprint = %fp, "cache miss; executing");
        Ok(Reservation::MustExecute(ticket))
    }

    /// Snapshot of the entry for `fp`, if committed.
    pub fn entry(&self, fp: Fingerprint) -> Option<CacheEntryInfo> {
        let st = self.state.lock();
        st.entries.get(&fp).map(|s| CacheEntryInfo {
            fingerprint: fp,
            dir: s.dir.clone(),
            size_bytes: s.size_bytes,
            created_secs: s.created_secs,
            refs: s.refs,
        })
    }

    /// Current occupancy.
    pub fn stats(&self) -> CacheStats {
        let st = self.state.lock();
        CacheStats {
            root: self.root.clone(),
            entries: st.entries.len(),
            total_bytes: st.total_bytes,
            budget_bytes: self.budget_bytes,
            in_flight: st.in_flight.len(),
        }
    }

    /// Remove every unreferenced entry. Returns the number removed.
    pub fn clear(&self) -> MatflowResult<usize> {
        let mut st = self.state.lock();
        let idle: Vec<Fingerprint> = st
            .entries
            .iter()
            .filter(|(_, s)| s.refs == 0)
            .map(|(fp, _)| *fp)
            .collect();
        for fp in &idle {
            if let Some(slot) = st.remove(*fp) {
                std::fs::remove_dir_all(&slot.dir).with_context(|| {
                    format!("failed to remove cache entry '{}'", slot.dir.display())
                })?;
            }
        }
        tracing::info!(removed = idle.len(), "cleared cache");
        Ok(idle.len())
    }

    /// Evict least-recently-used unreferenced entries until within budget.
    fn evict_locked(&self, st: &mut State) {
        while st.total_bytes > self.budget_bytes {
            let victim = st
                .entries
                .iter()
                .filter(|(_, s)| s.refs == 0)
                .min_by_key(|(_, s)| s.last_access)
                .map(|(fp, _)| *fp);
            let Some(fp) = victim else {
                break;
            };
            if let Some(slot) = st.remove(fp) {
                tracing::debug!(fingerprint = %fp, size_bytes = slot.size_bytes, "evicting cache entry");
                if let Err(e) = std::fs::remove_dir_all(&slot.dir) {
                    tracing::warn!(dir = %slot.dir.display(), error = %e, "failed to remove evicted cache entry");
                }
            }
        }
    }

    fn release_lease(&self, fp: Fingerprint) {
        let mut st = self.state.lock();
        if let Some(slot) = st.entries.get_mut(&fp) {
            slot.refs = slot.refs.saturating_sub(1);
        }
        self.evict_locked(&mut st);
    }

    fn release_ticket(&self, fp: Fingerprint) {
        let mut st = self.state.lock();
        st.in_flight.remove(&fp);
        self.changed.notify_all();
    }
}

fn read_meta(dir: &Path) -> Option<EntryMeta> {
    let text = std::fs::read_to_string(dir.join(META_FILE)).ok()?;
    serde_json::from_str(&text).ok()
}

/// Shared use of a committed entry; the entry is not evicted while any lease is alive.
#[derive(Debug)]
pub struct CacheLease<'a> {
    store: &'a CacheStore,
    fp: Fingerprint,
    dir: PathBuf,
}

impl CacheLease<'_> {
    /// Key of the leased entry.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fp
    }

    /// Directory holding the entry's files.
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for CacheLease<'_> {
    fn drop(&mut self) {
        self.store.release_lease(self.fp);
    }
}

/// Exclusive right to produce one fingerprint. Dropping without [`commit`](Self::commit)
/// releases the fingerprint so another worker may retry.
#[derive(Debug)]
pub struct CacheTicket<'a> {
    store: &'a CacheStore,
    fp: Fingerprint,
    staging: PathBuf,
    done: bool,
}

impl<'a> CacheTicket<'a> {
    /// Key being produced.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fp
    }

    /// Directory the producer writes into.
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Move the staged outputs into the store and wake waiters.
    pub fn commit(mut self) -> MatflowResult<CacheLease<'a>> {
        let store = self.store;
        let dest = store.root.join(self.fp.to_string());
        let size_bytes = dir_size(&self.staging)
            .map_err(|e| MatflowError::cache(format!("failed to size staged outputs: {e}")))?;
        let meta = EntryMeta {
            fingerprint: self.fp,
            size_bytes,
            created_secs: unix_now_secs(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| MatflowError::cache(format!("failed to encode entry metadata: {e}")))?;
        std::fs::write(self.staging.join(META_FILE), meta_json)
            .map_err(|e| MatflowError::cache(format!("failed to write entry metadata: {e}")))?;

        let mut st = store.state.lock();
        if dest.exists() {
            // Stale directory not tracked by the index.
            std::fs::remove_dir_all(&dest).map_err(|e| {
                MatflowError::cache(format!(
                    "failed to remove stale entry '{}': {e}",
                    dest.display()
                ))
            })?;
        }
        std::fs::rename(&self.staging, &dest).map_err(|e| {
            MatflowError::cache(format!(
                "failed to commit '{}' to '{}': {e}",
                self.staging.display(),
                dest.display()
            ))
        })?;

        st.tick += 1;
        let tick = st.tick;
        st.total_bytes += size_bytes;
        st.entries.insert(
            self.fp,
            Slot {
                dir: dest.clone(),
                size_bytes,
                created_secs: meta.created_secs,
                last_access: tick,
                refs: 1,
            },
        );
        st.in_flight.remove(&self.fp);
        self.done = true;
        store.evict_locked(&mut st);
        store.changed.notify_all();
        drop(st);

        tracing::debug!(fingerprint = %self.fp, size_bytes, "committed cache entry");
        Ok(CacheLease {
            store,
            fp: self.fp,
            dir: dest,
        })
    }

    /// Give up the fingerprint without committing.
    pub fn release(self) {}
}

impl Drop for CacheTicket<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.store.release_ticket(self.fp);
        if self.staging.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.staging)
        {
            tracing::warn!(dir = %self.staging.display(), error = %e, "failed to remove staging directory");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
