//! Message types for actor communication.

use ractor::RpcReplyPort;

/// Messages for the StalePurger.
#[derive(Debug)]
pub enum PurgerMessage {
    /// Periodic tick: run a purge pass.
    Tick,

    /// Run a purge pass now and report whether it succeeded.
    PurgeNow { reply: RpcReplyPort<bool> },

    /// Stop purging.
    Shutdown,
}
