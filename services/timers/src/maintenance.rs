//! Periodic maintenance of the in-memory store
//!
//! Redis expires timer keys itself. The memory backend only drops expired
//! entries lazily on read, so a cron job sweeps it.

use anyhow::Result;
use common::cache::KvStore;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

#[derive(Clone)]
pub struct StorePurger {
    store: KvStore,
}

impl StorePurger {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    /// Drop expired entries; returns how many were removed
    pub async fn purge(&self) -> usize {
        let purged = self.store.purge_expired().await;
        if purged > 0 {
            info!("Purged {} expired timers", purged);
        } else {
            debug!("No expired timers to purge");
        }
        purged
    }

    /// Run [`StorePurger::purge`] on a cron `schedule` (with seconds).
    ///
    /// The returned scheduler must be kept alive for the job to run.
    pub async fn start(&self, schedule: &str) -> Result<JobScheduler> {
        let purger = self.clone();

        let scheduler = JobScheduler::new().await?;

        let job = Job::new_async(schedule, move |_, _| {
            let purger = purger.clone();
            Box::pin(async move {
                purger.purge().await;
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Started store purge job with schedule: {}", schedule);
        Ok(scheduler)
    }
}
