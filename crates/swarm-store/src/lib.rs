pub mod error;
pub mod hot;
pub mod learning;
pub mod recorder;
pub mod sqlite;

pub use error::StoreError;
pub use hot::DebateCache;
pub use learning::{directional_hit, MemoryStore, Resolution};
pub use recorder::DecisionRecorder;
pub use sqlite::SqliteStore;
