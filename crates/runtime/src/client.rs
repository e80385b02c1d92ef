//! Caller-side adapter over a lazily started [`Worker`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use compute::{CellDetection, CellFilter, DetectionConfig, FilteredCells, PointDetection};
use formats::{CellMask, LayerConfig, TileFile};
use foundation::{CancelToken, RequestId};
use geometry::Ring;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::protocol::{RequestBody, ResponseBody, WorkerRequest, WorkerResponse};
use crate::worker::{Worker, WorkerConfig, WorkerStats};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("request {0} was cancelled")]
    Cancelled(RequestId),
    #[error("worker terminated before answering request {0}")]
    Terminated(RequestId),
    #[error("request {id} failed: {message}")]
    Failed { id: RequestId, message: String },
    #[error("request {id} expected a {expected} response, got {got}")]
    UnexpectedResponse {
        id: RequestId,
        expected: &'static str,
        got: &'static str,
    },
}

/// The eventual answer to one request.
///
/// Resolves with the typed result, or with [`WorkerError::Cancelled`],
/// [`WorkerError::Failed`], or [`WorkerError::Terminated`] when the worker
/// went away first.
#[must_use = "a pending request does nothing unless awaited or cancelled"]
pub struct PendingRequest<T> {
    id: RequestId,
    cancel: CancelToken,
    rx: oneshot::Receiver<WorkerResponse>,
    expected: &'static str,
    extract: fn(ResponseBody) -> Result<T, ResponseBody>,
}

impl<T> PendingRequest<T> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Asks the worker to stop this request. Takes effect before the job
    /// starts or at the job's next checkpoint; a job that already finished
    /// still delivers its result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn finish(&self, response: WorkerResponse) -> Result<T, WorkerError> {
        let id = self.id;
        match (self.extract)(response.body) {
            Ok(value) => Ok(value),
            Err(ResponseBody::Cancelled) => Err(WorkerError::Cancelled(id)),
            Err(ResponseBody::Error { error }) => Err(WorkerError::Failed { id, message: error }),
            Err(other) => Err(WorkerError::UnexpectedResponse {
                id,
                expected: self.expected,
                got: other.kind(),
            }),
        }
    }
}

impl<T> Future for PendingRequest<T> {
    type Output = Result<T, WorkerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(response)) => Poll::Ready(this.finish(response)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WorkerError::Terminated(this.id))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to one background engine.
///
/// The worker is started on the first request and can be terminated at any
/// time; the next request starts a fresh one.
pub struct WorkerClient {
    config: WorkerConfig,
    worker: Mutex<Option<Worker>>,
    next_id: AtomicU64,
    retired: Mutex<WorkerStats>,
}

impl WorkerClient {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            worker: Mutex::new(None),
            next_id: AtomicU64::new(1),
            retired: Mutex::new(WorkerStats::default()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn detect_points_in_polygon(
        &self,
        polygon: Ring,
        files: Vec<TileFile>,
        layer_config: LayerConfig,
        config: DetectionConfig,
    ) -> Result<PendingRequest<PointDetection>, WorkerError> {
        self.submit(
            RequestBody::DetectPointsInPolygon {
                polygon,
                files,
                layer_config,
                config,
            },
            "pointsDetected",
            |body| match body {
                ResponseBody::PointsDetected(v) => Ok(v),
                other => Err(other),
            },
        )
    }

    pub fn detect_cell_polygons_in_polygon(
        &self,
        polygon: Ring,
        cell_masks_data: Vec<CellMask>,
    ) -> Result<PendingRequest<CellDetection>, WorkerError> {
        self.submit(
            RequestBody::DetectCellPolygonsInPolygon {
                polygon,
                cell_masks_data,
            },
            "cellPolygonsDetected",
            |body| match body {
                ResponseBody::CellPolygonsDetected(v) => Ok(v),
                other => Err(other),
            },
        )
    }

    pub fn filter_cells(
        &self,
        cells_data: Vec<CellMask>,
        filter: CellFilter,
    ) -> Result<PendingRequest<FilteredCells>, WorkerError> {
        self.submit(
            RequestBody::FilterCells { cells_data, filter },
            "cellsFiltered",
            |body| match body {
                ResponseBody::CellsFiltered(v) => Ok(v),
                other => Err(other),
            },
        )
    }

    fn submit<T>(
        &self,
        body: RequestBody,
        expected: &'static str,
        extract: fn(ResponseBody) -> Result<T, ResponseBody>,
    ) -> Result<PendingRequest<T>, WorkerError> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancelToken::new();
        let request = WorkerRequest { id, body };

        let mut slot = self.worker.lock();
        if slot.is_none() {
            *slot = Some(Worker::spawn(&self.config)?);
        }
        let rx = match slot.as_ref().and_then(|w| w.submit(request, cancel.clone())) {
            Some(rx) => rx,
            None => {
                // Threads died; drop the husk so the next call starts over.
                self.retire(slot.take());
                return Err(WorkerError::Terminated(id));
            }
        };
        debug!(request = %id, expected, "submitted");

        Ok(PendingRequest {
            id,
            cancel,
            rx,
            expected,
            extract,
        })
    }

    /// Stops the worker. Every request still in flight resolves with
    /// [`WorkerError::Terminated`].
    pub fn terminate(&self) {
        let worker = self.worker.lock().take();
        self.retire(worker);
    }

    fn retire(&self, worker: Option<Worker>) {
        if let Some(worker) = worker {
            let stats = worker.stats();
            let mut retired = self.retired.lock();
            retired.completed += stats.completed;
            retired.failed += stats.failed;
            retired.cancelled += stats.cancelled;
            drop(retired);
            worker.shutdown();
        }
    }

    /// Counters accumulated across every worker this client has started.
    pub fn stats(&self) -> WorkerStats {
        let retired = *self.retired.lock();
        match self.worker.lock().as_ref() {
            Some(w) => {
                let live = w.stats();
                WorkerStats {
                    completed: retired.completed + live.completed,
                    failed: retired.failed + live.failed,
                    cancelled: retired.cancelled + live.cancelled,
                }
            }
            None => retired,
        }
    }
}

impl Default for WorkerClient {
    fn default() -> Self {
        Self::new(WorkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compute::NameFilter;
    use formats::{TileCoord, TranscriptPoint, encode_tile};
    use pretty_assertions::assert_eq;

    fn square(lo: f64, hi: f64) -> Ring {
        Ring::new(vec![[lo, lo], [hi, lo], [hi, hi], [lo, hi]])
    }

    fn files() -> Vec<TileFile> {
        vec![TileFile::new(
            TileCoord::new(0, 0, 0).path(),
            encode_tile(&[
                TranscriptPoint::new(1.0, 1.0, "Actb"),
                TranscriptPoint::new(20.0, 20.0, "Gapdh"),
            ]),
        )]
    }

    #[tokio::test]
    async fn worker_starts_lazily_and_answers() {
        let client = WorkerClient::default();
        assert!(!client.is_running());

        let pending = client
            .detect_points_in_polygon(
                square(0.0, 10.0),
                files(),
                LayerConfig::with_layers(0),
                DetectionConfig::default(),
            )
            .unwrap();
        assert!(client.is_running());

        let result = pending.await.unwrap();
        assert_eq!(result.point_count, 1);
        assert_eq!(result.gene_distribution.get("Actb"), Some(&1));
        assert_eq!(client.stats().completed, 1);
    }

    #[tokio::test]
    async fn concurrent_requests_of_same_kind_resolve_by_id() {
        let client = WorkerClient::new(WorkerConfig {
            threads: 2,
            ..WorkerConfig::default()
        });
        let small = client
            .detect_points_in_polygon(
                square(0.0, 10.0),
                files(),
                LayerConfig::with_layers(0),
                DetectionConfig::default(),
            )
            .unwrap();
        let large = client
            .detect_points_in_polygon(
                square(0.0, 30.0),
                files(),
                LayerConfig::with_layers(0),
                DetectionConfig::default(),
            )
            .unwrap();
        assert_ne!(small.id(), large.id());

        let (large, small) = (large.await.unwrap(), small.await.unwrap());
        assert_eq!(small.point_count, 1);
        assert_eq!(large.point_count, 2);
    }

    #[tokio::test]
    async fn detection_errors_are_reported() {
        let client = WorkerClient::default();
        let err = client
            .detect_cell_polygons_in_polygon(Ring::new(vec![[0.0, 0.0], [1.0, 1.0]]), vec![])
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Failed { .. }), "{err}");
        assert_eq!(client.stats().failed, 1);
    }

    /// Point detection over many tiles, one tile per batch. Every point lies
    /// outside the polygon, so the job keeps decoding until cancelled.
    fn heavy_detection(client: &WorkerClient) -> PendingRequest<PointDetection> {
        let points: Vec<_> = (0..20_000)
            .map(|i| TranscriptPoint::new(100.0 + i as f64, 100.0, "Actb"))
            .collect();
        let tile = encode_tile(&points);
        let files = (0..64)
            .map(|col| TileFile::new(TileCoord::new(6, col, 0).path(), tile.clone()))
            .collect();
        client
            .detect_points_in_polygon(
                square(0.0, 10.0),
                files,
                LayerConfig::with_layers(6),
                DetectionConfig {
                    tile_batch_size: 1,
                    ..DetectionConfig::default()
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let client = WorkerClient::default();
        let busy = heavy_detection(&client);
        let queued = client
            .filter_cells(vec![CellMask::new("1", "A", vec![])], CellFilter::default())
            .unwrap();
        let id = queued.id();
        queued.cancel();
        busy.cancel();

        assert!(matches!(busy.await, Err(WorkerError::Cancelled(_))));
        match queued.await {
            Err(WorkerError::Cancelled(got)) => assert_eq!(got, id),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!(client.stats().cancelled, 2);
        assert_eq!(client.stats().completed, 0);
    }

    #[tokio::test]
    async fn terminate_resolves_in_flight_requests() {
        let client = WorkerClient::default();
        let running = heavy_detection(&client);
        let queued = client
            .filter_cells(vec![CellMask::new("1", "A", vec![])], CellFilter::default())
            .unwrap();
        let (running_id, queued_id) = (running.id(), queued.id());

        client.terminate();
        assert!(!client.is_running());

        match running.await {
            Err(WorkerError::Terminated(got)) => assert_eq!(got, running_id),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        match queued.await {
            Err(WorkerError::Terminated(got)) => assert_eq!(got, queued_id),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn filter_cells_round_trip() {
        let client = WorkerClient::default();
        let cells = vec![
            CellMask::new("1", "A", vec![]),
            CellMask::new("2", "C", vec![]),
        ];
        let out = client
            .filter_cells(
                cells,
                CellFilter {
                    names: NameFilter::only(["A"]),
                    ..CellFilter::default()
                },
            )
            .unwrap()
            .await
            .unwrap();
        assert_eq!(out.unselected_cells_data.len(), 1);
        assert_eq!(out.outlier_cells_data.len(), 1);
    }

    #[tokio::test]
    async fn terminate_then_restart() {
        let client = WorkerClient::default();
        client
            .filter_cells(vec![], CellFilter::default())
            .unwrap()
            .await
            .unwrap();
        client.terminate();
        assert!(!client.is_running());

        let out = client
            .filter_cells(vec![CellMask::new("1", "A", vec![])], CellFilter::default())
            .unwrap()
            .await
            .unwrap();
        assert_eq!(out.unselected_cells_data.len(), 1);
        assert_eq!(client.stats().completed, 2);
    }

    #[tokio::test]
    async fn closed_reply_channel_means_terminated() {
        let (tx, rx) = oneshot::channel::<WorkerResponse>();
        let pending: PendingRequest<FilteredCells> = PendingRequest {
            id: RequestId(42),
            cancel: CancelToken::new(),
            rx,
            expected: "cellsFiltered",
            extract: |body| match body {
                ResponseBody::CellsFiltered(v) => Ok(v),
                other => Err(other),
            },
        };
        drop(tx);
        assert!(matches!(
            pending.await,
            Err(WorkerError::Terminated(RequestId(42)))
        ));
    }

    #[tokio::test]
    async fn mismatched_response_is_an_error() {
        let (tx, rx) = oneshot::channel::<WorkerResponse>();
        let pending: PendingRequest<FilteredCells> = PendingRequest {
            id: RequestId(5),
            cancel: CancelToken::new(),
            rx,
            expected: "cellsFiltered",
            extract: |body| match body {
                ResponseBody::CellsFiltered(v) => Ok(v),
                other => Err(other),
            },
        };
        tx.send(WorkerResponse {
            id: RequestId(5),
            body: ResponseBody::PointsDetected(PointDetection::default()),
        })
        .unwrap();
        match pending.await {
            Err(WorkerError::UnexpectedResponse { got, .. }) => assert_eq!(got, "pointsDetected"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
