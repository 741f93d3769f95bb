pub mod billing;
pub mod cache;
pub mod handler;
pub mod queue;
pub mod store;
pub mod writer;

pub use billing::{BillingEvaluator, Notifier};
pub use cache::QuotaCache;
pub use handler::MessageHandler;
pub use queue::{QueueConnector, TaskQueue};
pub use store::{RelationalStore, MAX_IDS_PER_QUERY};
pub use writer::RowWriter;
