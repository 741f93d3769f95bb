//! Tributary Memory: in-memory collaborators
//!
//! Implementations of every external interface the workers consume, backed by
//! process memory. Each one records what it was asked to do and supports
//! failure injection, which makes them the fixtures of choice for tests.

pub mod billing;
pub mod cache;
pub mod queue;
pub mod store;
pub mod writer;

pub use billing::{MemoryBillingEvaluator, RecordingNotifier};
pub use cache::MemoryQuotaCache;
pub use queue::{MemoryConnector, MemoryQueue};
pub use store::MemoryRelationalStore;
pub use writer::{MemoryRowWriter, WriteKind};
