// tasktally - Exclusive per-task time tracking over hydration-safe persisted state

pub mod blob;
pub mod clock;
pub mod color;
pub mod config;
pub mod engine;
pub mod jsonl;
pub mod keys;
pub mod models;
pub mod persistent;
pub mod store;
pub mod summary;
pub mod ticker;

// Re-export main types for convenience
pub use blob::{BlobStore, MemoryBlobStore};
pub use clock::{Clock, ManualClock, SystemClock, now_ms};
pub use config::{Backend, Config};
pub use engine::{EngineState, RunState, Subscription, TimerEngine};
pub use jsonl::JsonlBlobStore;
pub use keys::StoreKey;
pub use models::{AccentSettings, ClassifiedInput, Settings, Task, Theme, classify_input, format_elapsed};
pub use persistent::{Hydration, HydrationPhase, HydratedValue, PersistentStore, Snapshot};
pub use store::SqliteBlobStore;
pub use summary::{SummaryRow, Totals};
pub use ticker::Ticker;
