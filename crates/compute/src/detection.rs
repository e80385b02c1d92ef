//! Detection of transcript points and cell polygons inside drawn ROIs.
//!
//! Every input arrives as an argument; nothing here reads shared state.

use std::collections::HashSet;

use formats::{CellMask, LayerConfig, LocatedTile, TileFile, TranscriptPoint, decode_tile};
use foundation::cancel::CancelToken;
use geometry::{Ring, cell_in_polygon, point_in_polygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::distribution::{Distribution, count_by_label};
use crate::config::DetectionConfig;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionError {
    #[error("polygon has fewer than three distinct vertices")]
    DegenerateRing,
    #[error("polygon vertex {index} is not a finite coordinate")]
    NonFiniteVertex { index: usize },
    #[error("detection cancelled")]
    Cancelled,
}

/// Reported instead of a point list when a ROI selects too many points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitExceeded {
    pub total_points_found: usize,
    pub limit: usize,
    /// How much smaller (in percent of its current selection) the ROI would
    /// need to be to fit under the limit. Always at least 1.
    pub suggested_reduction_percent: u32,
}

impl LimitExceeded {
    pub fn new(total_points_found: usize, limit: usize) -> Self {
        let excess = total_points_found.saturating_sub(limit);
        let percent = (excess.saturating_mul(100)).div_ceil(total_points_found.max(1));
        Self {
            total_points_found,
            limit,
            suggested_reduction_percent: percent.clamp(1, 100) as u32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointDetection {
    pub points_in_polygon: Vec<TranscriptPoint>,
    /// Always equals `points_in_polygon.len()`.
    pub point_count: usize,
    pub gene_distribution: Distribution,
    /// Set when the match count went over the configured limit. The point
    /// list and distribution are then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_exceeded: Option<LimitExceeded>,
    pub tiles_scanned: usize,
    pub tiles_failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellDetection {
    #[serde(rename = "cellPolygonsInDrawnPolygon")]
    pub cell_polygons_in_polygon: Vec<CellMask>,
    /// Always equals `cell_polygons_in_polygon.len()`.
    pub cell_polygon_count: usize,
    pub cell_cluster_distribution: Distribution,
}

/// Rejects rings that cannot enclose anything.
pub fn validate_ring(ring: &Ring) -> Result<(), DetectionError> {
    if let Some(index) = ring
        .vertices()
        .iter()
        .position(|v| !v[0].is_finite() || !v[1].is_finite())
    {
        return Err(DetectionError::NonFiniteVertex { index });
    }
    if ring.is_degenerate() {
        return Err(DetectionError::DegenerateRing);
    }
    Ok(())
}

/// Finds the transcript points inside `ring`.
///
/// Only tiles at the configured maximum zoom are read. Tiles are decoded in
/// batches of `config.tile_batch_size`: tiles inside a batch in parallel,
/// batches in sequence. A tile that fails to decode contributes no points.
pub fn detect_points_in_polygon(
    ring: &Ring,
    files: &[TileFile],
    layer_config: &LayerConfig,
    config: &DetectionConfig,
    cancel: &CancelToken,
) -> Result<PointDetection, DetectionError> {
    let mut results = detect_points_in_polygons(
        std::slice::from_ref(ring),
        files,
        layer_config,
        config,
        cancel,
    )?;
    Ok(results.pop().unwrap_or_default())
}

/// Same as [`detect_points_in_polygon`] for several rings at once: each tile
/// is decoded a single time and its points are tested against every ring.
/// Results come back in ring order.
pub fn detect_points_in_polygons(
    rings: &[Ring],
    files: &[TileFile],
    layer_config: &LayerConfig,
    config: &DetectionConfig,
    cancel: &CancelToken,
) -> Result<Vec<PointDetection>, DetectionError> {
    for ring in rings {
        validate_ring(ring)?;
    }

    let tiles = formats::select_detection_tiles(files, layer_config);
    let batch_size = config.tile_batch_size.max(1);
    debug!(
        tiles = tiles.len(),
        rings = rings.len(),
        batch_size,
        zoom = layer_config.detection_zoom(),
        "scanning tiles"
    );

    let mut matches: Vec<Vec<TranscriptPoint>> = vec![Vec::new(); rings.len()];
    let mut tiles_failed = 0usize;

    for batch in tiles.chunks(batch_size) {
        if cancel.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }
        let outcomes: Vec<Option<Vec<Vec<TranscriptPoint>>>> =
            batch.par_iter().map(|tile| scan_tile(tile, rings)).collect();

        for outcome in outcomes {
            match outcome {
                Some(per_ring) => {
                    for (acc, found) in matches.iter_mut().zip(per_ring) {
                        acc.extend(found);
                    }
                }
                None => tiles_failed += 1,
            }
        }
    }

    Ok(matches
        .into_iter()
        .map(|points| finish_points(points, config, tiles.len(), tiles_failed))
        .collect())
}

/// Decodes one tile and sorts its points into per-ring buckets. `None` when
/// the tile cannot be decoded.
fn scan_tile(tile: &LocatedTile<'_>, rings: &[Ring]) -> Option<Vec<Vec<TranscriptPoint>>> {
    let decoded = match decode_tile(tile.coord, &tile.file.bytes) {
        Ok(t) => t,
        Err(err) => {
            warn!(tile = %tile.file.name, "{err}; counting it as empty");
            return None;
        }
    };

    let mut out: Vec<Vec<TranscriptPoint>> = vec![Vec::new(); rings.len()];
    let mut hits: Vec<usize> = Vec::with_capacity(rings.len());
    for point in decoded.points {
        let pos = point.position();
        hits.clear();
        hits.extend(
            rings
                .iter()
                .enumerate()
                .filter(|(_, ring)| point_in_polygon(pos, ring))
                .map(|(i, _)| i),
        );
        if let Some((&last, rest)) = hits.split_last() {
            for &i in rest {
                out[i].push(point.clone());
            }
            out[last].push(point);
        }
    }
    Some(out)
}

fn finish_points(
    mut points: Vec<TranscriptPoint>,
    config: &DetectionConfig,
    tiles_scanned: usize,
    tiles_failed: usize,
) -> PointDetection {
    if config.dedupe_positions {
        dedupe_by_position(&mut points);
    }

    if points.len() > config.max_transcript_points {
        let exceeded = LimitExceeded::new(points.len(), config.max_transcript_points);
        warn!(
            found = exceeded.total_points_found,
            limit = exceeded.limit,
            reduce_by_percent = exceeded.suggested_reduction_percent,
            "ROI selects more transcript points than allowed"
        );
        return PointDetection {
            limit_exceeded: Some(exceeded),
            tiles_scanned,
            tiles_failed,
            ..PointDetection::default()
        };
    }

    let gene_distribution = count_by_label(points.iter().map(|p| p.gene_name.as_deref()));
    PointDetection {
        point_count: points.len(),
        points_in_polygon: points,
        gene_distribution,
        limit_exceeded: None,
        tiles_scanned,
        tiles_failed,
    }
}

/// Keeps the first point at each exact position, preserving order.
fn dedupe_by_position(points: &mut Vec<TranscriptPoint>) {
    let mut seen: HashSet<(u64, u64)> = HashSet::with_capacity(points.len());
    points.retain(|p| seen.insert((canonical_bits(p.x), canonical_bits(p.y))));
}

fn canonical_bits(v: f64) -> u64 {
    // +0.0 and -0.0 are the same position.
    if v == 0.0 { 0 } else { v.to_bits() }
}

/// Finds the cell masks lying entirely inside `ring` (every outline vertex
/// inside) and counts them per cluster.
pub fn detect_cell_polygons_in_polygon(
    ring: &Ring,
    masks: &[CellMask],
    cancel: &CancelToken,
) -> Result<CellDetection, DetectionError> {
    let mut results =
        detect_cell_polygons_in_polygons(std::slice::from_ref(ring), masks, cancel)?;
    Ok(results.pop().unwrap_or_default())
}

const CELL_CANCEL_CHECK_INTERVAL: usize = 4_096;

pub fn detect_cell_polygons_in_polygons(
    rings: &[Ring],
    masks: &[CellMask],
    cancel: &CancelToken,
) -> Result<Vec<CellDetection>, DetectionError> {
    for ring in rings {
        validate_ring(ring)?;
    }

    let mut found: Vec<Vec<CellMask>> = vec![Vec::new(); rings.len()];
    for (n, mask) in masks.iter().enumerate() {
        if n % CELL_CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }
        for (acc, ring) in found.iter_mut().zip(rings) {
            if cell_in_polygon(&mask.vertices, ring) {
                acc.push(mask.clone());
            }
        }
    }

    Ok(found
        .into_iter()
        .map(|cells| {
            let cell_cluster_distribution =
                count_by_label(cells.iter().map(|c| c.cluster_id.as_deref()));
            CellDetection {
                cell_polygon_count: cells.len(),
                cell_polygons_in_polygon: cells,
                cell_cluster_distribution,
            }
        })
        .collect())
}
