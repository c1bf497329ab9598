//! Session registry
//!
//! Maps opaque integer handles to sessions. Handles come from a process-wide
//! counter and are never reused. A released handle leaves a tombstone so a second
//! release is reported as `DoubleRelease` rather than mistaken for an unknown
//! handle. Tombstones are bounded: once more than the limit accumulate, the
//! oldest are dropped and every pruned handle (and anything below it that is not
//! live) keeps reporting `DoubleRelease` through a watermark.
//!
//! The process-wide instance behind [`create_player`], [`resolve`] and
//! [`release_player`] is created on first use and torn down when its last live
//! session is released. Sessions are built outside its lock; only the insert,
//! the lookup and the teardown check hold it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::config::PlayerConfig;
use crate::engine::DecodeEngine;
use crate::error::{PlayerError, Result};
use crate::host::HostWindow;
use crate::session::PlayerSession;
use crate::types::WindowRegion;

/// Opaque session handle; 0 is never issued
pub type Handle = u64;

/// Tombstones kept per registry before the oldest are folded into the watermark
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 4096;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> Handle {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

fn build_session(
    handle: Handle,
    region: WindowRegion,
    engine: Arc<dyn DecodeEngine>,
    host: Arc<dyn HostWindow>,
    config: PlayerConfig,
) -> Result<Arc<PlayerSession>> {
    PlayerSession::create(handle, region, engine, host, config).map(Arc::new)
}

enum Entry {
    Live(Arc<PlayerSession>),
    Released,
}

#[derive(Default)]
struct Entries {
    map: AHashMap<Handle, Entry>,
    /// Tombstoned handles, oldest first
    released: VecDeque<Handle>,
    /// Absent handles below this were released and pruned
    pruned_below: Handle,
}

impl Entries {
    fn tombstone(&mut self, handle: Handle, limit: usize) {
        self.released.push_back(handle);
        while self.released.len() > limit {
            let Some(oldest) = self.released.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
            self.pruned_below = self.pruned_below.max(oldest.saturating_add(1));
        }
    }
}

/// Handle → session map
pub struct SessionRegistry {
    entries: RwLock<Entries>,
    tombstone_limit: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_tombstone_limit(DEFAULT_TOMBSTONE_LIMIT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tombstone_limit(limit: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            tombstone_limit: limit,
        }
    }

    /// Create a session and register it under a fresh handle.
    pub fn create(
        &self,
        region: WindowRegion,
        engine: Arc<dyn DecodeEngine>,
        host: Arc<dyn HostWindow>,
        config: PlayerConfig,
    ) -> Result<Handle> {
        let handle = next_handle();
        let session = build_session(handle, region, engine, host, config)?;
        self.insert(handle, session);
        Ok(handle)
    }

    fn insert(&self, handle: Handle, session: Arc<PlayerSession>) {
        self.entries.write().map.insert(handle, Entry::Live(session));
    }

    pub fn resolve(&self, handle: Handle) -> Result<Arc<PlayerSession>> {
        match self.entries.read().map.get(&handle) {
            Some(Entry::Live(session)) => Ok(Arc::clone(session)),
            _ => Err(PlayerError::InvalidHandle),
        }
    }

    /// Tombstone the handle and hand back its session without stopping it.
    fn detach(&self, handle: Handle) -> Result<Arc<PlayerSession>> {
        let mut entries = self.entries.write();
        let pruned_below = entries.pruned_below;
        let session = match entries.map.get_mut(&handle) {
            None if handle != 0 && handle < pruned_below => {
                return Err(PlayerError::DoubleRelease)
            }
            None => return Err(PlayerError::InvalidHandle),
            Some(Entry::Released) => return Err(PlayerError::DoubleRelease),
            Some(entry) => match std::mem::replace(entry, Entry::Released) {
                Entry::Live(session) => session,
                Entry::Released => return Err(PlayerError::DoubleRelease),
            },
        };
        entries.tombstone(handle, self.tombstone_limit);
        Ok(session)
    }

    /// Remove the session and stop its threads. Returns after both the decode
    /// and presentation threads have exited.
    pub fn destroy(&self, handle: Handle) -> Result<()> {
        let session = self.detach(handle)?;
        session.release();
        Ok(())
    }

    pub fn contains(&self, handle: Handle) -> bool {
        matches!(self.entries.read().map.get(&handle), Some(Entry::Live(_)))
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .read()
            .map
            .values()
            .filter(|entry| matches!(entry, Entry::Live(_)))
            .count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.entries.read().released.len()
    }
}

struct GlobalState {
    registry: Option<Arc<SessionRegistry>>,
    /// Every handle below this belonged to a torn-down registry and was released
    retired_below: Handle,
}

static GLOBAL: RwLock<GlobalState> = parking_lot::const_rwlock(GlobalState {
    registry: None,
    retired_below: 0,
});

fn current() -> Option<Arc<SessionRegistry>> {
    GLOBAL.read().registry.clone()
}

/// The process-wide registry, created on first use.
pub fn global() -> Arc<SessionRegistry> {
    if let Some(registry) = current() {
        return registry;
    }
    let mut global = GLOBAL.write();
    Arc::clone(global.registry.get_or_insert_with(|| {
        tracing::debug!("initializing session registry");
        Arc::new(SessionRegistry::new())
    }))
}

/// Whether the process-wide registry currently exists.
pub fn is_initialized() -> bool {
    GLOBAL.read().registry.is_some()
}

/// Create a session in the process-wide registry.
pub fn create_player(
    region: WindowRegion,
    engine: Arc<dyn DecodeEngine>,
    host: Arc<dyn HostWindow>,
    config: PlayerConfig,
) -> Result<Handle> {
    let handle = next_handle();
    let session = build_session(handle, region, engine, host, config)?;

    // The registry may have been torn down while the session was built.
    let mut global = GLOBAL.write();
    global
        .registry
        .get_or_insert_with(|| {
            tracing::debug!("initializing session registry");
            Arc::new(SessionRegistry::new())
        })
        .insert(handle, session);
    Ok(handle)
}

pub fn resolve(handle: Handle) -> Result<Arc<PlayerSession>> {
    match current() {
        Some(registry) => registry.resolve(handle),
        None => Err(PlayerError::InvalidHandle),
    }
}

/// Release a session from the process-wide registry, tearing the registry
/// down when this was its last live session.
pub fn release_player(handle: Handle) -> Result<()> {
    let session = {
        let mut global = GLOBAL.write();
        let retired = handle != 0 && handle < global.retired_below;
        let detached = match &global.registry {
            Some(registry) => registry.detach(handle),
            None => Err(PlayerError::InvalidHandle),
        };
        let session = match detached {
            Ok(session) => session,
            Err(PlayerError::InvalidHandle) if retired => return Err(PlayerError::DoubleRelease),
            Err(err) => return Err(err),
        };

        if global.registry.as_ref().is_some_and(|r| r.live_count() == 0) {
            tracing::debug!("last session released, tearing down registry");
            global.registry = None;
            global.retired_below = NEXT_HANDLE.load(Ordering::Relaxed);
        }
        session
    };

    session.release();
    Ok(())
}
