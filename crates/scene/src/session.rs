//! Caller-side policy: how edits, detection results and failures change the
//! ROI store.

use compute::{CellFilter, DetectionConfig, FilteredCells, LimitExceeded};
use formats::{CellMask, LayerConfig, RoiFileError, TileFile, parse_roi_file};
use foundation::RoiId;
use geometry::{Ring, self_intersects};
use runtime::{WorkerClient, WorkerConfig, WorkerError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::edit::EditEvent;
use crate::roi::RoiStore;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no ROI with id {0}")]
    UnknownRoi(RoiId),
    #[error(transparent)]
    RoiFile(#[from] RoiFileError),
}

/// Data that detection runs against.
#[derive(Debug, Clone, Default)]
pub struct DataSources {
    pub files: Vec<TileFile>,
    pub layer_config: LayerConfig,
    pub cell_masks: Option<Vec<CellMask>>,
}

/// What happened to the ROI after an edit was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum EditOutcome {
    /// Results for the ROI were replaced.
    Detected { id: RoiId },
    /// The new ring crosses itself; the edit was not applied.
    #[serde(rename_all = "camelCase")]
    SelfIntersecting {
        id: Option<RoiId>,
        edges: Option<(usize, usize)>,
    },
    /// Too many points selected; the edit was undone.
    LimitExceeded {
        id: RoiId,
        exceeded: LimitExceeded,
        reverted: Revert,
    },
    /// The geometry was kept but its properties are unset.
    DetectionFailed { id: RoiId, error: String },
    Removed { id: RoiId },
    Cleared { removed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Revert {
    /// A newly added ROI was deleted.
    Deleted,
    /// The ROI got its previous geometry back.
    Restored,
}

impl EditOutcome {
    /// Outcomes the user should be told about.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            EditOutcome::SelfIntersecting { .. }
                | EditOutcome::LimitExceeded { .. }
                | EditOutcome::DetectionFailed { .. }
        )
    }
}

/// Owns the ROI store and the background engines, and applies edits.
pub struct RoiSession {
    store: RoiStore,
    sources: DataSources,
    config: DetectionConfig,
    detection: WorkerClient,
    filtering: WorkerClient,
}

impl RoiSession {
    pub fn new(sources: DataSources, config: DetectionConfig) -> Self {
        Self::with_workers(sources, config, WorkerConfig::default())
    }

    /// `worker` is used for both engines; thread names get an engine suffix.
    pub fn with_workers(sources: DataSources, config: DetectionConfig, worker: WorkerConfig) -> Self {
        let engine = |suffix: &str| WorkerConfig {
            thread_name: format!("{}-{suffix}", worker.thread_name),
            ..worker.clone()
        };
        Self {
            store: RoiStore::new(),
            sources,
            config,
            detection: WorkerClient::new(engine("detect")),
            filtering: WorkerClient::new(engine("filter")),
        }
    }

    pub fn store(&self) -> &RoiStore {
        &self.store
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    /// Swaps the data providers. Stored results are kept; callers decide
    /// whether to re-run detection.
    pub fn set_sources(&mut self, sources: DataSources) {
        self.sources = sources;
    }

    pub fn detection_client(&self) -> &WorkerClient {
        &self.detection
    }

    pub async fn apply(&mut self, event: EditEvent) -> Result<EditOutcome, SessionError> {
        match event {
            EditEvent::Added { ring } => {
                if let Some(rejected) = self.reject_if_self_intersecting(None, &ring) {
                    return Ok(rejected);
                }
                let id = self.store.add(ring);
                info!(roi = %id, "ROI added");
                Ok(self.detect(id, None).await)
            }
            EditEvent::GeometryChanged { id, ring } => {
                if !self.store.contains(id) {
                    return Err(SessionError::UnknownRoi(id));
                }
                if let Some(rejected) = self.reject_if_self_intersecting(Some(id), &ring) {
                    return Ok(rejected);
                }
                let previous = self.store.set_geometry(id, ring);
                Ok(self.detect(id, previous).await)
            }
            EditEvent::Removed { id } => {
                self.store.remove(id).ok_or(SessionError::UnknownRoi(id))?;
                info!(roi = %id, "ROI removed");
                Ok(EditOutcome::Removed { id })
            }
            EditEvent::Cleared => {
                let removed = self.store.clear();
                info!(removed, "ROIs cleared");
                Ok(EditOutcome::Cleared { removed })
            }
        }
    }

    /// Adds every ROI in a ROI file and runs detection for each in turn.
    /// Self-intersecting rings are skipped, like drawn ones. Outcomes follow
    /// file order.
    pub async fn import_rois(&mut self, payload: &str) -> Result<Vec<EditOutcome>, SessionError> {
        let imported = parse_roi_file(payload)?;
        info!(count = imported.len(), "importing ROIs");
        let mut outcomes = Vec::with_capacity(imported.len());
        for roi in imported {
            if let Some(rejected) = self.reject_if_self_intersecting(None, &roi.ring) {
                outcomes.push(rejected);
                continue;
            }
            let id = self.store.insert(roi.requested_id, roi.ring);
            outcomes.push(self.detect(id, None).await);
        }
        Ok(outcomes)
    }

    pub fn export_rois(&self) -> Result<String, SessionError> {
        Ok(self.store.export()?)
    }

    /// Partitions the loaded cell masks. Any failure yields every cell kept
    /// and no outliers.
    pub async fn filter_cells(&self, filter: CellFilter) -> FilteredCells {
        let Some(masks) = self.sources.cell_masks.as_ref() else {
            return FilteredCells::default();
        };
        let result = match self.filtering.filter_cells(masks.clone(), filter) {
            Ok(pending) => pending.await,
            Err(err) => Err(err),
        };
        filtered_or_passthrough(masks, result)
    }

    /// Stops both engines; they restart on the next request.
    pub fn terminate(&self) {
        self.detection.terminate();
        self.filtering.terminate();
    }

    fn reject_if_self_intersecting(&self, id: Option<RoiId>, ring: &Ring) -> Option<EditOutcome> {
        let check = self_intersects(ring);
        if !check.has_intersection {
            return None;
        }
        warn!(roi = ?id, edges = ?check.edges, "rejecting self-intersecting polygon");
        Some(EditOutcome::SelfIntersecting {
            id,
            edges: check.edges,
        })
    }

    /// Runs point then cell detection for `id` and applies the result.
    /// `previous` is the geometry to restore if the edit must be undone; for
    /// a new ROI it is `None` and the ROI is deleted instead.
    async fn detect(&mut self, id: RoiId, previous: Option<Ring>) -> EditOutcome {
        let Some(ring) = self.store.get(id).map(|f| f.ring.clone()) else {
            return EditOutcome::DetectionFailed {
                id,
                error: format!("ROI {id} disappeared"),
            };
        };

        let points = match self.run_point_detection(ring.clone()).await {
            Ok(p) => p,
            Err(err) => return self.fail(id, &err),
        };

        if let Some(exceeded) = points.limit_exceeded {
            let reverted = match previous {
                Some(prev) => {
                    self.store.set_geometry(id, prev);
                    Revert::Restored
                }
                None => {
                    self.store.remove(id);
                    Revert::Deleted
                }
            };
            warn!(
                roi = %id,
                found = exceeded.total_points_found,
                limit = exceeded.limit,
                ?reverted,
                "edit undone: point limit exceeded"
            );
            return EditOutcome::LimitExceeded {
                id,
                exceeded,
                reverted,
            };
        }

        let cells = match self.sources.cell_masks.clone() {
            Some(masks) => {
                let result = match self.detection.detect_cell_polygons_in_polygon(ring, masks) {
                    Ok(pending) => pending.await,
                    Err(err) => Err(err),
                };
                match result {
                    Ok(c) => Some(c),
                    Err(err) => return self.fail(id, &err),
                }
            }
            None => None,
        };

        debug!(
            roi = %id,
            points = points.point_count,
            cells = cells.as_ref().map(|c| c.cell_polygon_count),
            "detection finished"
        );
        self.store.set_results(id, points, cells);
        EditOutcome::Detected { id }
    }

    async fn run_point_detection(
        &self,
        ring: Ring,
    ) -> Result<compute::PointDetection, WorkerError> {
        self.detection
            .detect_points_in_polygon(
                ring,
                self.sources.files.clone(),
                self.sources.layer_config,
                self.config,
            )?
            .await
    }

    fn fail(&mut self, id: RoiId, err: &WorkerError) -> EditOutcome {
        error!(roi = %id, "detection failed: {err}");
        self.store.clear_results(id);
        EditOutcome::DetectionFailed {
            id,
            error: err.to_string(),
        }
    }
}

fn filtered_or_passthrough(
    masks: &[CellMask],
    result: Result<FilteredCells, WorkerError>,
) -> FilteredCells {
    result.unwrap_or_else(|err| {
        warn!("cell filtering failed, keeping every cell: {err}");
        FilteredCells::passthrough(masks)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::RequestId;
    use pretty_assertions::assert_eq;

    fn masks() -> Vec<CellMask> {
        vec![
            CellMask::new("c1", "T", vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0]),
            CellMask::new("c2", "B", vec![7.0, 7.0, 8.0, 7.0, 8.0, 8.0]),
        ]
    }

    #[test]
    fn failed_filtering_keeps_every_cell() {
        let masks = masks();
        for err in [
            WorkerError::Terminated(RequestId(3)),
            WorkerError::Failed {
                id: RequestId(4),
                message: "boom".into(),
            },
        ] {
            let out = filtered_or_passthrough(&masks, Err(err));
            assert_eq!(out.unselected_cells_data, masks);
            assert!(out.outlier_cells_data.is_empty());
        }
    }

    #[test]
    fn successful_filtering_is_returned_as_is() {
        let masks = masks();
        let split = FilteredCells {
            unselected_cells_data: masks[..1].to_vec(),
            outlier_cells_data: masks[1..].to_vec(),
        };
        assert_eq!(filtered_or_passthrough(&masks, Ok(split.clone())), split);
    }
}
