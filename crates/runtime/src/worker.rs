//! Worker service: named background threads executing protocol requests.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use compute::{
    DetectionError, detect_cell_polygons_in_polygon, detect_points_in_polygon, env_var_usize,
    filter_cells,
};
use foundation::{CancelToken, RequestId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::protocol::{RequestBody, ResponseBody, WorkerRequest, WorkerResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Threads serving one engine. One keeps requests strictly sequential.
    pub threads: usize,
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            thread_name: "roi-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Defaults overridden by `ROI_WORKER_THREADS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            threads: env_var_usize("ROI_WORKER_THREADS", d.threads).max(1),
            ..d
        }
    }

    pub fn named(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl Counters {
    fn record(&self, body: &ResponseBody) {
        let counter = match body {
            ResponseBody::Error { .. } => &self.failed,
            ResponseBody::Cancelled => &self.cancelled,
            _ => &self.completed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

struct Slot {
    reply: oneshot::Sender<WorkerResponse>,
    cancel: CancelToken,
}

/// Requests accepted but not yet answered.
type Registry = Arc<Mutex<HashMap<RequestId, Slot>>>;

/// A running worker. Dropping it (or calling [`Worker::shutdown`]) fails every
/// unanswered request; their reply channels close.
pub struct Worker {
    tx: mpsc::UnboundedSender<WorkerRequest>,
    registry: Registry,
    counters: Arc<Counters>,
    threads: Vec<JoinHandle<()>>,
    name: String,
}

impl Worker {
    pub fn spawn(config: &WorkerConfig) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<WorkerRequest>();
        let rx = Arc::new(Mutex::new(rx));
        let registry: Registry = Arc::default();
        let counters = Arc::new(Counters::default());

        let count = config.threads.max(1);
        let mut threads = Vec::with_capacity(count);
        for n in 0..count {
            let rx = Arc::clone(&rx);
            let registry = Arc::clone(&registry);
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("{}-{n}", config.thread_name))
                .spawn(move || serve(&rx, &registry, &counters))?;
            threads.push(handle);
        }
        info!(name = %config.thread_name, threads = count, "worker started");

        Ok(Self {
            tx,
            registry,
            counters,
            threads,
            name: config.thread_name.clone(),
        })
    }

    /// Queues `request`. `None` when the worker threads are gone.
    pub fn submit(
        &self,
        request: WorkerRequest,
        cancel: CancelToken,
    ) -> Option<oneshot::Receiver<WorkerResponse>> {
        let (reply, rx) = oneshot::channel();
        let id = request.id;
        self.registry.lock().insert(id, Slot { reply, cancel });
        if self.tx.send(request).is_err() {
            self.registry.lock().remove(&id);
            return None;
        }
        Some(rx)
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    pub fn in_flight(&self) -> usize {
        self.registry.lock().len()
    }

    /// Cancels running jobs and drops every pending reply channel. Threads
    /// exit once their current job observes the cancellation.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let pending: Vec<(RequestId, Slot)> = self.registry.lock().drain().collect();
        for (id, slot) in &pending {
            debug!(request = %id, "dropping pending request");
            slot.cancel.cancel();
        }
        debug!(
            name = %self.name,
            abandoned = pending.len(),
            threads = self.threads.len(),
            stats = ?self.counters.snapshot(),
            "worker stopped"
        );
    }
}

fn serve(
    rx: &Mutex<mpsc::UnboundedReceiver<WorkerRequest>>,
    registry: &Mutex<HashMap<RequestId, Slot>>,
    counters: &Counters,
) {
    loop {
        // The lock is only held while waiting; the job runs unlocked.
        let Some(request) = rx.lock().blocking_recv() else {
            break;
        };
        let id = request.id;
        let Some(cancel) = registry.lock().get(&id).map(|s| s.cancel.clone()) else {
            // Abandoned before it started.
            continue;
        };

        let kind = request.body.kind();
        let body = if cancel.is_cancelled() {
            ResponseBody::Cancelled
        } else {
            debug!(request = %id, kind, "running");
            match catch_unwind(AssertUnwindSafe(|| execute(request.body, &cancel))) {
                Ok(body) => body,
                Err(_) => {
                    error!(request = %id, kind, "job panicked");
                    ResponseBody::Error {
                        error: format!("{kind} panicked"),
                    }
                }
            }
        };

        if let ResponseBody::Error { error } = &body {
            warn!(request = %id, kind, "{error}");
        }
        counters.record(&body);

        let Some(slot) = registry.lock().remove(&id) else {
            continue;
        };
        if slot.reply.send(WorkerResponse { id, body }).is_err() {
            debug!(request = %id, "caller went away before the reply");
        }
    }
}

/// Runs one request to completion.
pub fn execute(body: RequestBody, cancel: &CancelToken) -> ResponseBody {
    match body {
        RequestBody::DetectPointsInPolygon {
            polygon,
            files,
            layer_config,
            config,
        } => respond(
            detect_points_in_polygon(&polygon, &files, &layer_config, &config, cancel),
            ResponseBody::PointsDetected,
        ),
        RequestBody::DetectCellPolygonsInPolygon {
            polygon,
            cell_masks_data,
        } => respond(
            detect_cell_polygons_in_polygon(&polygon, &cell_masks_data, cancel),
            ResponseBody::CellPolygonsDetected,
        ),
        RequestBody::FilterCells { cells_data, filter } => {
            ResponseBody::CellsFiltered(filter_cells(&cells_data, &filter))
        }
    }
}

fn respond<T>(result: Result<T, DetectionError>, wrap: fn(T) -> ResponseBody) -> ResponseBody {
    match result {
        Ok(v) => wrap(v),
        Err(DetectionError::Cancelled) => ResponseBody::Cancelled,
        Err(e) => ResponseBody::Error {
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compute::CellFilter;
    use formats::CellMask;
    use geometry::Ring;

    #[test]
    fn execute_maps_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let body = execute(
            RequestBody::DetectCellPolygonsInPolygon {
                polygon: Ring::new(vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]]),
                cell_masks_data: vec![CellMask::new("1", "A", vec![1.0, 0.5, 2.0, 0.5, 2.0, 1.0])],
            },
            &cancel,
        );
        assert_eq!(body.kind(), "cancelled");
    }

    #[test]
    fn execute_filters_cells() {
        let body = execute(
            RequestBody::FilterCells {
                cells_data: vec![CellMask::new("1", "A", vec![])],
                filter: CellFilter::default(),
            },
            &CancelToken::new(),
        );
        match body {
            ResponseBody::CellsFiltered(out) => assert_eq!(out.unselected_cells_data.len(), 1),
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let worker = Worker::spawn(&WorkerConfig::named("test-worker")).unwrap();
        assert_eq!(worker.in_flight(), 0);
        worker.shutdown();
    }

    #[test]
    fn default_config_is_one_thread() {
        let c = WorkerConfig::default();
        assert_eq!(c.threads, 1);
        assert_eq!(c.thread_name, "roi-worker");
    }
}
