//! Tributary Worker: queue consumers
//!
//! Two worker kinds drain the partitioned queue:
//!
//! - [`MessageWorker`] handles one task at a time, retries it in place and
//!   commits it once the final attempt is over, success or not.
//! - [`BatchWorker`] buffers tasks, demultiplexes them into typed row
//!   collections and hands them to the [`FlushOrchestrator`], committing the
//!   last buffered position only when every sub-flush of the cycle succeeded.
//!
//! Both run inside a per-iteration recovery boundary and are usually driven by
//! a [`WorkerPool`].

pub mod batch;
pub mod buffer;
pub mod data_sync;
pub mod filter;
pub mod flush;
pub mod message;
pub mod pool;
pub mod shutdown;
pub mod worker;

pub use batch::BatchWorker;
pub use buffer::{BatchBuffer, DrainedBatch, TypedRows};
pub use data_sync::IdentifierSync;
pub use filter::NoiseFilter;
pub use flush::{FlushCycle, FlushOrchestrator};
pub use message::MessageWorker;
pub use pool::{WorkerFactory, WorkerPool};
pub use shutdown::ShutdownHandle;
pub use worker::{IngestWorker, IterationStats};
