// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod batch;
pub mod config;
pub mod digest;
pub mod ingest;
pub mod item;
pub mod metrics;
pub mod ranking;
pub mod store;
pub mod surface;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use analyze::{Analysis, Urgency};
pub use api::{create_router, AppState};
pub use batch::{AlreadyRunning, BatchCoordinator, BatchReport, BatchSettings};
pub use item::{AnalyzedItem, DisplayItem, Item};
pub use surface::{ReadSurface, Status, SurfaceSnapshot};
