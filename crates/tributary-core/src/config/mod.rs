pub mod worker;

pub use worker::WorkerConfig;
