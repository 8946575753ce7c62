//! An embeddable, multi-tier caching layer with pluggable storage backends.
//!
//! # Features
//! - **Tiered Storage**: Register any number of backends in priority order;
//!   entries are placed explicitly, by a default tier, or by smart
//!   classification over size, TTL, and data shape.
//! - **Pluggable Eviction**: Seven built-in policies (LRU, LFU, FIFO, MRU,
//!   random, TTL-aware, adaptive hybrid) behind one trait, or bring your own.
//! - **Serialization Memoization**: Repeated writes of structurally equal
//!   values reuse their serialized bytes.
//! - **Multi-Writer Sync**: An optional coordinator propagates mutations
//!   between caches over a broadcast transport, detecting conflicts with
//!   vector clocks and settling them by a configurable strategy.
//! - **Observability**: Per-tier and engine-wide counters, plus typed cache
//!   events dispatched to registered listeners.

// Public modules that form the API
pub mod builder;
pub mod clock;
pub mod entry;
pub mod error;
pub mod events;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod selector;
pub mod sync;
pub mod tier;
pub mod traits;
pub mod value;
pub mod vclock;

// Internal, crate-only modules
mod serial;
mod store;
mod task;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use error::{BuildError, CacheError};
pub use events::{CacheEvent, EventListener};
pub use metrics::{CacheStats, TierStats};
pub use orchestrator::{CacheOrchestrator, SetOptions};
pub use policy::{EvictionPolicy, PolicyKind};
pub use selector::{SelectionReason, SelectorThresholds, TierDecision};
pub use sync::{ConflictStrategy, SyncConfig, SyncCoordinator, SyncHandle, SyncMessage, SyncOp};
pub use tier::TierId;
pub use traits::{Broadcast, Cipher, KeyObfuscator, StorageBackend};
pub use value::{CacheValue, DataKind};
pub use vclock::{ClockOrdering, VectorClock};
