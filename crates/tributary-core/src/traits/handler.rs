use crate::error::Result;
use crate::types::Task;
use async_trait::async_trait;

/// Domain handler for tasks processed one at a time
///
/// Invoked by the single-message worker; the handler may be called more than
/// once for the same task when earlier attempts fail.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<()>;
}
