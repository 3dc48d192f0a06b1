//! Cooperative unload hook

use async_trait::async_trait;

/// Registered by a module that wants a say before it is unloaded.
///
/// Returning `false` vetoes the unload. There is no built-in deadline: a
/// negotiator that never returns blocks the unload call that asked it.
#[async_trait]
pub trait GentleUnload: Send + Sync {
    /// Prepare for unloading and report whether it may go ahead
    async fn ask_for_gentle_unload(&self) -> bool;
}
