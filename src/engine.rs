// Exclusive-timer state machine

use crate::blob::BlobStore;
use crate::clock::{Clock, SystemClock};
use crate::color::{parse_hex, to_hex};
use crate::keys::{AccentKey, ActiveTaskKey, DisplayModeKey, QuickAccessKey, StoreKey, TasksKey};
use crate::models::{
    ACCENT_PRESETS, AccentSettings, MAX_QUICK_ACCESS, Settings, Task, Theme, classify_input, normalize_quick_access,
};
use crate::persistent::{Hydration, PersistentStore, Snapshot};
use crate::summary::Totals;
use crate::ticker::Ticker;
use tracing::{debug, info, warn};

/// Whether a task is accruing time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(String),
}

/// Tasks plus the id of the one accruing time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineState {
    /// Display order
    pub tasks: Vec<Task>,
    /// Always references a task in `tasks` when set
    pub active_task_id: Option<String>,
}

impl EngineState {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.active_task_id.as_deref().and_then(|id| self.task(id))
    }

    pub fn run_state(&self) -> RunState {
        match &self.active_task_id {
            Some(id) => RunState::Running(id.clone()),
            None => RunState::Idle,
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active_task_id.as_deref() == Some(id)
    }

    /// Whether a task other than `except` already uses `name` (ignoring case)
    fn name_taken(&self, name: &str, except: Option<&str>) -> bool {
        self.tasks
            .iter()
            .any(|t| Some(t.id.as_str()) != except && t.name_matches(name))
    }
}

type Listener = Box<dyn FnMut(&EngineState, &Settings)>;

/// Handle returned by [`TimerEngine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// The timer engine.
///
/// Holds the task list, the single active task id and the settings, and
/// writes every committed change through the [`PersistentStore`]. Until the
/// hydration signal fires the engine runs on defaults and writes nothing;
/// hydration replaces that provisional state with what was persisted.
pub struct TimerEngine<B, C = SystemClock> {
    store: PersistentStore<B>,
    clock: C,
    state: EngineState,
    settings: Settings,
    hydration: Hydration,
    ticker: Ticker,
    last_tick: Option<i64>,
    max_tick_delta_ms: Option<u64>,
    listeners: Vec<(Subscription, Listener)>,
    next_subscription: u64,
}

impl<B: BlobStore, C: Clock> TimerEngine<B, C> {
    pub fn new(store: PersistentStore<B>, clock: C) -> Self {
        Self {
            store,
            clock,
            state: EngineState::default(),
            settings: Settings::default(),
            hydration: Hydration::new(),
            ticker: Ticker::default(),
            last_tick: None,
            max_tick_delta_ms: None,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Use a different nominal tick period
    pub fn with_tick_period(mut self, period_ms: u64) -> Self {
        self.ticker = Ticker::new(period_ms);
        self
    }

    /// Cap the time a single tick may credit
    pub fn with_max_tick_delta(mut self, max_ms: Option<u64>) -> Self {
        self.max_tick_delta_ms = max_ms;
        self
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn tasks(&self) -> &[Task] {
        &self.state.tasks
    }

    pub fn active_task_id(&self) -> Option<&str> {
        self.state.active_task_id.as_deref()
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.state.active_task()
    }

    pub fn run_state(&self) -> RunState {
        self.state.run_state()
    }

    pub fn is_running(&self) -> bool {
        self.state.active_task_id.is_some()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn theme(&self) -> Theme {
        self.settings.theme()
    }

    pub fn hydration(&self) -> &Hydration {
        &self.hydration
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn store(&self) -> &PersistentStore<B> {
        &self.store
    }

    pub fn into_store(self) -> PersistentStore<B> {
        self.store
    }

    /// Totals and the descending summary
    pub fn derived_totals(&self) -> Totals {
        Totals::compute(&self.state.tasks)
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Call `listener` after every committed change
    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&EngineState, &Settings) + 'static,
    {
        self.next_subscription += 1;
        let subscription = Subscription(self.next_subscription);
        self.listeners.push((subscription, Box::new(listener)));
        subscription
    }

    /// Returns false if the subscription was already removed
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(s, _)| *s != subscription);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        for (_, listener) in &mut self.listeners {
            listener(&self.state, &self.settings);
        }
    }

    /// Persist `snapshot` (once hydrated) and notify listeners
    fn commit(&mut self, snapshot: Snapshot) {
        if self.hydration.is_hydrated() {
            self.store.write_snapshot(snapshot);
        } else {
            debug!(keys = ?snapshot.keys(), "Not hydrated yet, change kept in memory");
        }
        self.notify();
    }

    // ========================================================================
    // Hydration
    // ========================================================================

    /// The runtime is attached; storage becomes readable on the next frame
    pub fn mount(&mut self) {
        self.hydration.mount();
    }

    /// Signal a rendered frame. On the frame that hydrates, persisted state
    /// replaces the provisional state; returns true in that case.
    pub fn frame(&mut self) -> bool {
        if !self.hydration.frame() {
            return false;
        }
        self.load_persisted();
        true
    }

    /// Mount and hydrate immediately, for hosts without a render loop
    pub fn hydrate(&mut self) -> bool {
        self.mount();
        self.frame()
    }

    /// Call `listener` once storage is readable; immediately if it already is
    pub fn on_hydrated<F: FnMut() + 'static>(&mut self, listener: F) {
        self.hydration.on_hydrated(listener);
    }

    /// Stored value for `K`, but `initial` until the hydration signal fires
    pub fn read_hydrated<K: StoreKey>(&self, initial: K::Value) -> K::Value {
        self.store.read_hydrated::<K>(initial).into_current(&self.hydration)
    }

    fn load_persisted(&mut self) {
        let mut repairs = Snapshot::new();

        let (tasks, tasks_repaired) = sanitize_tasks(self.store.load::<TasksKey>());
        if tasks_repaired {
            repairs.put::<TasksKey>(&tasks);
        }

        let mut active_task_id = self.store.load::<ActiveTaskKey>();
        let dangling = match &active_task_id {
            Some(id) => !tasks.iter().any(|t| &t.id == id),
            None => false,
        };
        if dangling {
            warn!(id = ?active_task_id, "Persisted active task no longer exists, starting idle");
            active_task_id = None;
            repairs.put::<ActiveTaskKey>(&None);
        }

        let stored_quick_access = self.store.load::<QuickAccessKey>();
        let quick_access = normalize_quick_access(&stored_quick_access);
        if quick_access != stored_quick_access {
            repairs.put::<QuickAccessKey>(&quick_access);
        }

        self.state = EngineState { tasks, active_task_id };
        self.settings = Settings {
            accent: self.store.load::<AccentKey>(),
            dark_mode: self.store.load::<DisplayModeKey>(),
            quick_access,
        };

        let now = self.clock.now_ms();
        if self.state.active_task_id.is_some() {
            self.last_tick = Some(now);
            self.ticker.arm(now);
        } else {
            self.last_tick = None;
            self.ticker.disarm();
        }

        info!(
            tasks = self.state.tasks.len(),
            active = ?self.state.active_task_id,
            "Loaded persisted state"
        );
        self.commit(repairs);
    }

    // ========================================================================
    // Task commands
    // ========================================================================

    /// Append a task. Returns its id, or `None` if the name is empty or taken.
    pub fn add_task(&mut self, name: &str, is_external_item: bool) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            debug!("Ignoring task with empty name");
            return None;
        }
        if self.state.name_taken(name, None) {
            debug!(name, "Ignoring duplicate task name");
            return None;
        }

        let task = Task::new(name, is_external_item);
        let id = task.id.clone();
        self.state.tasks.push(task);

        let mut snapshot = Snapshot::new();
        snapshot.put::<TasksKey>(&self.state.tasks);
        self.commit(snapshot);
        Some(id)
    }

    /// Classify raw input (work item number or plain name) and add it
    pub fn add_task_from_input(&mut self, raw: &str) -> Option<String> {
        let classified = classify_input(raw);
        self.add_task(classified.name(), classified.is_external_item())
    }

    /// Rename a task. A case-only change of the same task is allowed.
    pub fn rename_task(&mut self, id: &str, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.state.name_taken(name, Some(id)) {
            debug!(id, name, "Ignoring rename");
            return false;
        }

        let Some(task) = self.state.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "Ignoring rename of unknown task");
            return false;
        };
        if task.name == name {
            return false;
        }
        task.name = name.to_string();

        let mut snapshot = Snapshot::new();
        snapshot.put::<TasksKey>(&self.state.tasks);
        self.commit(snapshot);
        true
    }

    /// Delete a task. Removing the running task stops the timer in the same step.
    pub fn remove_task(&mut self, id: &str) -> bool {
        let Some(index) = self.state.tasks.iter().position(|t| t.id == id) else {
            debug!(id, "Ignoring removal of unknown task");
            return false;
        };

        self.state.tasks.remove(index);
        if self.state.is_active(id) {
            self.state.active_task_id = None;
            self.stop_ticking();
        }

        let mut snapshot = Snapshot::new();
        snapshot.put::<TasksKey>(&self.state.tasks);
        snapshot.put::<ActiveTaskKey>(&self.state.active_task_id);
        self.commit(snapshot);
        true
    }

    /// Delete every task and stop the timer
    pub fn clear_all(&mut self) {
        self.state.tasks.clear();
        self.state.active_task_id = None;
        self.stop_ticking();

        let mut snapshot = Snapshot::new();
        snapshot.put::<TasksKey>(&self.state.tasks);
        snapshot.put::<ActiveTaskKey>(&None);
        self.commit(snapshot);
    }

    // ========================================================================
    // Timer commands
    // ========================================================================

    /// Make `id` the only running task, replacing whichever task was running
    pub fn start_task(&mut self, id: &str) -> bool {
        if self.state.task(id).is_none() {
            debug!(id, "Ignoring start of unknown task");
            return false;
        }

        self.state.active_task_id = Some(id.to_string());
        let now = self.clock.now_ms();
        self.last_tick = Some(now);
        self.ticker.arm(now);

        let mut snapshot = Snapshot::new();
        snapshot.put::<ActiveTaskKey>(&self.state.active_task_id);
        self.commit(snapshot);
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state.active_task_id.is_none() {
            return false;
        }

        self.state.active_task_id = None;
        self.stop_ticking();

        let mut snapshot = Snapshot::new();
        snapshot.put::<ActiveTaskKey>(&None);
        self.commit(snapshot);
        true
    }

    /// Pause if `id` is running, otherwise start it
    pub fn toggle_task(&mut self, id: &str) -> bool {
        if self.state.is_active(id) {
            self.pause()
        } else {
            self.start_task(id)
        }
    }

    /// Credit the wall-clock time since the previous tick to the running task.
    ///
    /// Returns whether any time was credited. Does nothing while idle.
    pub fn tick(&mut self, now: i64) -> bool {
        let Some(active_id) = self.state.active_task_id.clone() else {
            return false;
        };

        let last = self.last_tick.unwrap_or(now);
        self.last_tick = Some(now);

        // A clock that stepped backwards credits nothing
        let mut delta = now.saturating_sub(last).max(0) as u64;
        match self.max_tick_delta_ms {
            Some(cap) if delta > cap => {
                warn!(delta, cap, "Tick gap exceeds cap, crediting cap only");
                delta = cap;
            }
            _ => {}
        }
        if delta == 0 {
            return false;
        }

        let Some(task) = self.state.tasks.iter_mut().find(|t| t.id == active_id) else {
            return false;
        };
        task.elapsed = task.elapsed.saturating_add(delta);

        let mut snapshot = Snapshot::new();
        snapshot.put::<TasksKey>(&self.state.tasks);
        self.commit(snapshot);
        true
    }

    /// Fire the repeating timer if it is due. Returns whether time was credited.
    pub fn poll_tick(&mut self) -> bool {
        let now = self.clock.now_ms();
        if self.ticker.poll(now) { self.tick(now) } else { false }
    }

    /// Session teardown: cancel the timer, keep the persisted state as is
    pub fn shutdown(&mut self) {
        self.stop_ticking();
        debug!("Timer engine shut down");
    }

    fn stop_ticking(&mut self) {
        self.ticker.disarm();
        self.last_tick = None;
    }

    // ========================================================================
    // Settings commands
    // ========================================================================

    /// Select a palette preset, clearing any custom color
    pub fn select_accent_preset(&mut self, index: usize) -> bool {
        if index >= ACCENT_PRESETS.len() {
            debug!(index, "Ignoring unknown accent preset");
            return false;
        }
        self.set_accent(AccentSettings::preset(index))
    }

    /// Use a custom `#rrggbb` accent, overriding the preset
    pub fn set_custom_accent(&mut self, color: &str) -> bool {
        let Some(rgb) = parse_hex(color.trim()) else {
            debug!(color, "Ignoring invalid accent color");
            return false;
        };
        self.set_accent(AccentSettings {
            preset_index: self.settings.accent.preset_index,
            custom_color: Some(to_hex(rgb)),
        })
    }

    fn set_accent(&mut self, accent: AccentSettings) -> bool {
        if self.settings.accent == accent {
            return false;
        }
        self.settings.accent = accent;

        let mut snapshot = Snapshot::new();
        snapshot.put::<AccentKey>(&self.settings.accent);
        self.commit(snapshot);
        true
    }

    pub fn set_display_mode(&mut self, dark: bool) -> bool {
        if self.settings.dark_mode == dark {
            return false;
        }
        self.settings.dark_mode = dark;

        let mut snapshot = Snapshot::new();
        snapshot.put::<DisplayModeKey>(&dark);
        self.commit(snapshot);
        true
    }

    /// Replace the quick-access list (trimmed, deduplicated, at most six)
    pub fn set_quick_access<I, S>(&mut self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = normalize_quick_access(names);
        if self.settings.quick_access == names {
            return false;
        }
        self.settings.quick_access = names;
        self.commit_quick_access();
        true
    }

    pub fn add_quick_access(&mut self, name: &str) -> bool {
        let name = name.trim();
        let quick_access = &self.settings.quick_access;
        if name.is_empty()
            || quick_access.len() >= MAX_QUICK_ACCESS
            || quick_access.iter().any(|n| n.to_lowercase() == name.to_lowercase())
        {
            debug!(name, "Ignoring quick-access entry");
            return false;
        }

        self.settings.quick_access.push(name.to_string());
        self.commit_quick_access();
        true
    }

    pub fn remove_quick_access(&mut self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        let before = self.settings.quick_access.len();
        self.settings.quick_access.retain(|n| n.to_lowercase() != name);
        if self.settings.quick_access.len() == before {
            return false;
        }
        self.commit_quick_access();
        true
    }

    fn commit_quick_access(&mut self) {
        let mut snapshot = Snapshot::new();
        snapshot.put::<QuickAccessKey>(&self.settings.quick_access);
        self.commit(snapshot);
    }
}

/// Drop persisted tasks that break the id or name invariants.
///
/// Returns the kept tasks and whether anything was changed.
fn sanitize_tasks(tasks: Vec<Task>) -> (Vec<Task>, bool) {
    let mut kept: Vec<Task> = Vec::with_capacity(tasks.len());
    let mut repaired = false;

    for mut task in tasks {
        let name = task.name.trim().to_string();
        if name.is_empty() || kept.iter().any(|t| t.id == task.id || t.name_matches(&name)) {
            warn!(id = %task.id, name = %task.name, "Dropping invalid persisted task");
            repaired = true;
            continue;
        }
        if name != task.name {
            task.name = name;
            repaired = true;
        }
        kept.push(task);
    }

    (kept, repaired)
}
