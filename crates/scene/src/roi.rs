use compute::analysis::Distribution;
use compute::{CellDetection, PointDetection};
use formats::{ImportedRoi, RoiFileError, write_roi_file};
use foundation::RoiId;
use geometry::Ring;
use serde::Serialize;

/// A drawn region of interest with the results of its last detection.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonFeature {
    pub polygon_id: RoiId,
    pub ring: Ring,
    points: Option<PointDetection>,
    cells: Option<CellDetection>,
}

/// Derived values shown for a ROI. Unset until detection succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiProperties {
    pub point_count: Option<usize>,
    pub gene_distribution: Option<Distribution>,
    pub cell_polygon_count: Option<usize>,
    pub cell_cluster_distribution: Option<Distribution>,
}

impl PolygonFeature {
    pub fn new(polygon_id: RoiId, ring: Ring) -> Self {
        Self {
            polygon_id,
            ring,
            points: None,
            cells: None,
        }
    }

    pub fn points(&self) -> Option<&PointDetection> {
        self.points.as_ref()
    }

    pub fn cells(&self) -> Option<&CellDetection> {
        self.cells.as_ref()
    }

    /// Counts are read from the stored result lists, so they always match.
    pub fn properties(&self) -> RoiProperties {
        RoiProperties {
            point_count: self.points.as_ref().map(|p| p.points_in_polygon.len()),
            gene_distribution: self.points.as_ref().map(|p| p.gene_distribution.clone()),
            cell_polygon_count: self.cells.as_ref().map(|c| c.cell_polygons_in_polygon.len()),
            cell_cluster_distribution: self
                .cells
                .as_ref()
                .map(|c| c.cell_cluster_distribution.clone()),
        }
    }
}

/// Ordered set of ROIs keyed by unique positive ids.
#[derive(Debug, Default)]
pub struct RoiStore {
    features: Vec<PolygonFeature>,
}

impl RoiStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolygonFeature> {
        self.features.iter()
    }

    pub fn ids(&self) -> Vec<RoiId> {
        self.features.iter().map(|f| f.polygon_id).collect()
    }

    pub fn contains(&self, id: RoiId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: RoiId) -> Option<&PolygonFeature> {
        self.features.iter().find(|f| f.polygon_id == id)
    }

    fn position(&self, id: RoiId) -> Option<usize> {
        self.features.iter().position(|f| f.polygon_id == id)
    }

    fn get_mut(&mut self, id: RoiId) -> Option<&mut PolygonFeature> {
        self.features.iter_mut().find(|f| f.polygon_id == id)
    }

    /// One above the largest id in use, or 1 for an empty store. When the
    /// largest id is `u32::MAX` the lowest unused id is returned instead.
    pub fn next_id(&self) -> RoiId {
        match self.features.iter().map(|f| f.polygon_id).max() {
            None => RoiId::FIRST,
            Some(max) => max.checked_next().unwrap_or_else(|| self.lowest_free_id()),
        }
    }

    fn lowest_free_id(&self) -> RoiId {
        let mut used = self.ids();
        used.sort_unstable();
        let mut candidate = RoiId::FIRST;
        for id in used {
            if id > candidate {
                break;
            }
            if id == candidate {
                match candidate.checked_next() {
                    Some(next) => candidate = next,
                    None => break,
                }
            }
        }
        candidate
    }

    pub fn add(&mut self, ring: Ring) -> RoiId {
        self.insert(None, ring)
    }

    /// Adds a ROI under `requested` when that id is free, otherwise under
    /// [`RoiStore::next_id`].
    pub fn insert(&mut self, requested: Option<RoiId>, ring: Ring) -> RoiId {
        let id = match requested {
            Some(id) if !self.contains(id) => id,
            _ => self.next_id(),
        };
        self.features.push(PolygonFeature::new(id, ring));
        id
    }

    pub fn import(&mut self, rois: Vec<ImportedRoi>) -> Vec<RoiId> {
        rois.into_iter()
            .map(|roi| self.insert(roi.requested_id, roi.ring))
            .collect()
    }

    /// Replaces the geometry of `id`, returning the previous ring. Stored
    /// results are left in place until new ones arrive.
    pub fn set_geometry(&mut self, id: RoiId, ring: Ring) -> Option<Ring> {
        let feature = self.get_mut(id)?;
        Some(std::mem::replace(&mut feature.ring, ring))
    }

    /// Replaces (never merges) the results of `id`. Returns false for an
    /// unknown id.
    pub fn set_results(
        &mut self,
        id: RoiId,
        points: PointDetection,
        cells: Option<CellDetection>,
    ) -> bool {
        match self.get_mut(id) {
            Some(feature) => {
                feature.points = Some(points);
                feature.cells = cells;
                true
            }
            None => false,
        }
    }

    pub fn clear_results(&mut self, id: RoiId) -> bool {
        match self.get_mut(id) {
            Some(feature) => {
                feature.points = None;
                feature.cells = None;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: RoiId) -> Option<PolygonFeature> {
        let idx = self.position(id)?;
        Some(self.features.remove(idx))
    }

    pub fn clear(&mut self) -> usize {
        let n = self.features.len();
        self.features.clear();
        n
    }

    pub fn export(&self) -> Result<String, RoiFileError> {
        write_roi_file(self.features.iter().map(|f| (f.polygon_id, &f.ring)))
    }
}
