//! Background actor that deletes stale job records.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use jobqueue_core::{JobStorageProvider, JobStorageRecord, StaleJobSearchParams};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio_util::sync::CancellationToken;

use crate::messages::PurgerMessage;

/// Default time between purge passes.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Arguments for spawning a [`StalePurger`].
pub struct PurgerArgs<S> {
    pub storage: Arc<S>,
    pub interval: Duration,
    pub shutdown: CancellationToken,
}

/// State for the purger actor.
pub struct PurgerState<S> {
    storage: Arc<S>,
    shutdown: CancellationToken,
}

/// Periodically asks storage to delete complete and expired records.
///
/// Purge errors are logged and swallowed; the next tick tries again.
pub struct StalePurger<R, S>(PhantomData<fn() -> (R, S)>);

impl<R, S> StalePurger<R, S> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R, S> Default for StalePurger<R, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, S> StalePurger<R, S>
where
    R: JobStorageRecord,
    S: JobStorageProvider<R>,
{
    async fn purge(state: &PurgerState<S>) -> bool {
        let params = StaleJobSearchParams::new(state.shutdown.clone());
        match state.storage.purge_stale(params).await {
            Ok(()) => {
                tracing::debug!("Stale job records purged");
                true
            }
            Err(e) => {
                tracing::warn!("Job storage 'purge-stale' error: {}", e);
                false
            }
        }
    }
}

impl<R, S> Actor for StalePurger<R, S>
where
    R: JobStorageRecord,
    S: JobStorageProvider<R>,
{
    type Msg = PurgerMessage;
    type State = PurgerState<S>;
    type Arguments = PurgerArgs<S>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting stale job purger (interval {:?})", args.interval);

        let shutdown = args.shutdown.clone();
        let interval = args.interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        let _ = myself.send_message(PurgerMessage::Shutdown);
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if myself.send_message(PurgerMessage::Tick).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(PurgerState {
            storage: args.storage,
            shutdown: args.shutdown,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PurgerMessage::Tick => {
                if !state.shutdown.is_cancelled() {
                    Self::purge(state).await;
                }
            }

            PurgerMessage::PurgeNow { reply } => {
                let purged = Self::purge(state).await;
                let _ = reply.send(purged);
            }

            PurgerMessage::Shutdown => {
                tracing::info!("Shutting down stale job purger");
                myself.stop(None);
            }
        }

        Ok(())
    }
}
