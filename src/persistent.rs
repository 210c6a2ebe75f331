// Typed, failure-absorbing access to a blob store plus the hydration signal

use crate::blob::BlobStore;
use crate::keys::StoreKey;
use tracing::{debug, info, warn};

/// Typed wrapper around a [`BlobStore`].
///
/// Reads never fail: absent, unavailable, or malformed data all yield the
/// caller's initial value. Writes never fail either: rejected writes are
/// logged and the caller's in-memory value stays authoritative.
pub struct PersistentStore<B> {
    blob: B,
}

impl<B: BlobStore> PersistentStore<B> {
    pub fn new(blob: B) -> Self {
        Self { blob }
    }

    pub fn blob(&self) -> &B {
        &self.blob
    }

    pub fn into_inner(self) -> B {
        self.blob
    }

    /// Stored value for `K`, or `initial`
    pub fn read<K: StoreKey>(&self, initial: K::Value) -> K::Value {
        if !self.blob.is_available() {
            debug!(key = K::NAME, "Storage unavailable, using initial value");
            return initial;
        }

        let raw = match self.blob.get(K::NAME) {
            Ok(Some(raw)) => raw,
            Ok(None) => return initial,
            Err(e) => {
                warn!(key = K::NAME, error = ?e, "Failed to read key, using initial value");
                return initial;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = K::NAME, error = ?e, "Malformed stored value, using initial value");
                initial
            }
        }
    }

    /// Stored value for `K`, or its default
    pub fn load<K: StoreKey>(&self) -> K::Value {
        self.read::<K>(K::default_value())
    }

    /// Read `K` as a provisional value that only becomes visible once hydrated
    pub fn read_hydrated<K: StoreKey>(&self, initial: K::Value) -> HydratedValue<K::Value> {
        let stored = self.read::<K>(initial.clone());
        HydratedValue { initial, stored }
    }

    /// Serialize and store `value`. Returns whether it was persisted.
    pub fn write<K: StoreKey>(&mut self, value: &K::Value) -> bool {
        let mut snapshot = Snapshot::new();
        snapshot.put::<K>(value);
        self.write_snapshot(snapshot)
    }

    /// Store every entry of `snapshot` in one backend write.
    ///
    /// Returns whether it was persisted.
    pub fn write_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.is_empty() {
            return true;
        }

        if !self.blob.is_available() {
            warn!(keys = ?snapshot.keys(), "Storage unavailable, keeping state in memory only");
            return false;
        }

        let result = match snapshot.entries.as_slice() {
            [(key, value)] => self.blob.set(key, value),
            entries => self.blob.set_many(entries),
        };

        match result {
            Ok(()) => {
                debug!(keys = ?snapshot.keys(), "Persisted snapshot");
                true
            }
            Err(e) => {
                warn!(keys = ?snapshot.keys(), error = ?e, "Write rejected, keeping state in memory only");
                false
            }
        }
    }
}

/// Serialized values for several keys, written together
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: Vec<(&'static str, String)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the value for `K`
    pub fn put<K: StoreKey>(&mut self, value: &K::Value) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = K::NAME, error = ?e, "Failed to serialize value, skipping");
                return;
            }
        };

        match self.entries.iter_mut().find(|(key, _)| *key == K::NAME) {
            Some(entry) => entry.1 = json,
            None => self.entries.push((K::NAME, json)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(key, _)| *key).collect()
    }
}

/// Where the hydration signal is in its single transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HydrationPhase {
    /// Not mounted; storage must not be trusted yet
    #[default]
    Pending,
    /// Mounted; the transition fires on the next paint frame
    Scheduled,
    /// Storage is readable. Terminal.
    Hydrated,
}

type HydrationListener = Box<dyn FnMut()>;

/// One-shot "storage is now readable" signal.
///
/// Mounting schedules the transition; it fires on the first frame after
/// mounting, exactly once, and never reverts.
#[derive(Default)]
pub struct Hydration {
    phase: HydrationPhase,
    listeners: Vec<HydrationListener>,
}

impl Hydration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> HydrationPhase {
        self.phase
    }

    pub fn is_hydrated(&self) -> bool {
        self.phase == HydrationPhase::Hydrated
    }

    /// Register a listener for the transition.
    ///
    /// A listener registered after the signal fired is called immediately.
    pub fn on_hydrated<F: FnMut() + 'static>(&mut self, mut listener: F) {
        if self.is_hydrated() {
            listener();
        } else {
            self.listeners.push(Box::new(listener));
        }
    }

    /// The runtime environment is attached. Schedules the transition.
    pub fn mount(&mut self) {
        if self.phase == HydrationPhase::Pending {
            debug!("Hydration scheduled for next frame");
            self.phase = HydrationPhase::Scheduled;
        }
    }

    /// A paint frame has been rendered. Returns true on the frame that hydrates.
    pub fn frame(&mut self) -> bool {
        if self.phase != HydrationPhase::Scheduled {
            return false;
        }

        self.phase = HydrationPhase::Hydrated;
        info!("Storage hydrated");
        for mut listener in self.listeners.drain(..) {
            listener();
        }
        true
    }
}

impl std::fmt::Debug for Hydration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hydration")
            .field("phase", &self.phase)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// A value read from storage that is provisional until hydration
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedValue<T> {
    initial: T,
    stored: T,
}

impl<T> HydratedValue<T> {
    /// The value to render right now
    pub fn current(&self, hydration: &Hydration) -> &T {
        if hydration.is_hydrated() {
            &self.stored
        } else {
            &self.initial
        }
    }

    pub fn into_current(self, hydration: &Hydration) -> T {
        if hydration.is_hydrated() { self.stored } else { self.initial }
    }
}
