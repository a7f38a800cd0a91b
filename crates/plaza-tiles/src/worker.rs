use crate::job::{TileJob, TileRenderer};
use plaza_logger::{log, LogSeverity::*};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Where updaters hand their jobs off.
pub trait JobSink: Send + Sync {
    fn dispatch(&self, job: TileJob);
}

/// Fixed set of workers sharing one job queue. A failed job is logged and
/// dropped; the worker moves on to the next one.
pub struct TileWorkerPool {
    sender: mpsc::UnboundedSender<TileJob>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TileWorkerPool {
    pub fn spawn(renderer: Arc<TileRenderer>, workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<TileJob>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let handles = (0..workers.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let renderer = renderer.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(job) = next else {
                            break;
                        };
                        if let Err(e) = renderer.run(job).await {
                            log(format!("Tiling: worker {} failed {:?}: {}", id, job, e), Error);
                        }
                    }
                })
            })
            .collect();
        log(format!("Tiling: started {} workers", workers.max(1)), Info);
        Self {
            sender,
            workers: Mutex::new(handles),
        }
    }

    /// Stops every worker. Jobs still queued are discarded.
    pub fn shutdown(&self) {
        let handles = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for handle in handles {
            handle.abort();
        }
    }
}

impl JobSink for TileWorkerPool {
    fn dispatch(&self, job: TileJob) {
        if self.sender.send(job).is_err() {
            log(format!("Tiling: pool is gone, dropped {:?}", job), Warning);
        }
    }
}
