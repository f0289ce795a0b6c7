//! Bounded pool of sandbox ids.
//!
//! The available set is a bounded channel of `BoxId`s rather than a counting
//! semaphore plus a free list, so receiving an id and removing it from the
//! set is one atomic operation. Capacity invariant: at every quiescent
//! moment, every id created at startup is either in the channel, held by
//! exactly one session, or quarantined.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;
use tracing::info;
use tracing::warn;

use crate::error::Result;
use crate::error::RunnerErr;
use crate::sandbox::BoxId;
use crate::sandbox::SandboxDriver;

/// How many times `release` attempts to re-init a box before quarantining it.
const REINIT_ATTEMPTS: u32 = 3;
const REINIT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct BoxPool {
    capacity: usize,
    tx: async_channel::Sender<BoxId>,
    rx: async_channel::Receiver<BoxId>,
    driver: Arc<dyn SandboxDriver>,
}

impl BoxPool {
    /// Init every box id in `0..capacity` and fill the pool. Any init
    /// failure is fatal: a server that cannot produce its full capacity of
    /// clean sandboxes should not come up at all.
    pub async fn initialize(capacity: usize, driver: Arc<dyn SandboxDriver>) -> Result<Self> {
        info!("initializing {capacity} sandbox boxes");
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        for i in 0..capacity {
            let id = BoxId(i as u32);
            let box_dir = driver.init(id).await?;
            info!("initialized box {id}: {box_dir}");
            if tx.send(id).await.is_err() {
                return Err(RunnerErr::PoolClosed);
            }
        }
        info!("all {capacity} boxes initialized");
        Ok(Self {
            capacity,
            tx,
            rx,
            driver,
        })
    }

    pub fn size(&self) -> usize {
        self.capacity
    }

    /// Approximate count of available boxes; a consistent snapshot at an
    /// unspecified instant, good enough for health reporting and the
    /// admission fast path.
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    pub fn try_acquire(&self) -> Option<BoxId> {
        self.rx.try_recv().ok()
    }

    /// Block until a box becomes available or `deadline` elapses.
    pub async fn acquire(&self, deadline: Duration) -> Result<BoxId> {
        match tokio::time::timeout(deadline, self.rx.recv()).await {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(_)) => Err(RunnerErr::PoolClosed),
            Err(_) => Err(RunnerErr::AcquireTimedOut),
        }
    }

    /// Clean up and re-init `id`, then return it to the available set.
    ///
    /// A cleanup failure is logged and does not block the re-init attempt.
    /// A box whose re-init keeps failing is quarantined: it never re-enters
    /// the pool and effective capacity drops. No session may ever observe a
    /// sandbox in an undefined state.
    pub async fn release(&self, id: BoxId) {
        if let Err(err) = self.driver.cleanup(id).await {
            warn!("cleanup of box {id} failed, attempting re-init anyway: {err}");
        }

        for attempt in 1..=REINIT_ATTEMPTS {
            match self.driver.init(id).await {
                Ok(_) => {
                    if self.tx.send(id).await.is_err() {
                        error!("box pool closed while returning box {id}");
                    }
                    return;
                }
                Err(err) if attempt < REINIT_ATTEMPTS => {
                    warn!("re-init of box {id} failed (attempt {attempt}): {err}");
                    tokio::time::sleep(REINIT_RETRY_DELAY).await;
                }
                Err(err) => {
                    error!(
                        "re-init of box {id} failed after {REINIT_ATTEMPTS} attempts, \
                         quarantining it: {err}"
                    );
                }
            }
        }
    }
}
