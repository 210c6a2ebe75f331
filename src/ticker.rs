// The single repeating tick timer

/// Default nominal tick period in milliseconds
pub const DEFAULT_TICK_MS: u64 = 1000;

/// An armed repeating timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    generation: u64,
    next_due: i64,
}

/// Slot holding at most one repeating timer.
///
/// Arming replaces whatever timer was armed before, so two timers can never
/// overlap. The host polls it with the current time; the next tick is always
/// scheduled from the actual poll time, not from the nominal schedule.
#[derive(Debug, Clone)]
pub struct Ticker {
    period_ms: u64,
    slot: Option<Interval>,
    generations: u64,
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_MS)
    }
}

impl Ticker {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            slot: None,
            generations: 0,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Start a fresh timer, cancelling any armed one. Returns its generation.
    pub fn arm(&mut self, now: i64) -> u64 {
        self.generations += 1;
        self.slot = Some(Interval {
            generation: self.generations,
            next_due: due_after(now, self.period_ms),
        });
        self.generations
    }

    /// Cancel the armed timer, if any
    pub fn disarm(&mut self) {
        self.slot = None;
    }

    pub fn is_armed(&self) -> bool {
        self.slot.is_some()
    }

    /// Generation of the armed timer
    pub fn generation(&self) -> Option<u64> {
        self.slot.map(|interval| interval.generation)
    }

    /// When the armed timer next fires
    pub fn next_due(&self) -> Option<i64> {
        self.slot.map(|interval| interval.next_due)
    }

    /// Whether a tick is due at `now`. A due tick reschedules the timer.
    pub fn poll(&mut self, now: i64) -> bool {
        match &mut self.slot {
            Some(interval) if now >= interval.next_due => {
                interval.next_due = due_after(now, self.period_ms);
                true
            }
            _ => false,
        }
    }
}

/// One period after `now`, saturating for huge periods
fn due_after(now: i64, period_ms: u64) -> i64 {
    now.saturating_add(i64::try_from(period_ms).unwrap_or(i64::MAX))
}
