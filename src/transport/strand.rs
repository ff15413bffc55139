//! A serialized execution context.
//!
//! Jobs posted to a strand run one after another on a single worker task,
//! in posting order. Each job runs to completion before the next one is
//! polled for the first time.

use std::future::Future;
use std::pin::Pin;

use log::debug;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Boxed unit of work run by a strand
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// FIFO executor backed by one worker task
#[derive(Debug, Clone)]
pub struct Strand {
    name: &'static str,
    sender: mpsc::UnboundedSender<Job>,
}

impl Strand {
    /// Spawn the worker on `handle`
    pub fn spawn_on(handle: &Handle, name: &'static str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        handle.spawn(strand_loop(name, receiver));
        Self { name, sender }
    }

    /// Queue a job behind every job posted before it.
    ///
    /// Returns `false` if the worker is gone; the job is dropped unpolled.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender.send(Box::pin(job)).is_ok()
    }

    /// Label used in log lines
    pub fn name(&self) -> &'static str {
        self.name
    }
}

async fn strand_loop(name: &'static str, mut receiver: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = receiver.recv().await {
        job.await;
    }
    debug!("Strand {name} shutting down: no more jobs");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_jobs_run_in_post_order() {
        let strand = Strand::spawn_on(&Handle::current(), "test");
        let order = Arc::new(Mutex::new(Vec::new()));

        for (i, delay) in [30u64, 0, 10].into_iter().enumerate() {
            let order = order.clone();
            assert!(strand.post(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                order.lock().unwrap().push(i);
            }));
        }

        let (done, finished) = oneshot::channel();
        strand.post(async move {
            let _ = done.send(());
        });
        finished.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(strand.name(), "test");
    }
}
