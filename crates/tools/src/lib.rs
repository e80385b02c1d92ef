//! Pieces of the `roi` command line that are worth testing on their own.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use compute::analysis::Distribution;
use compute::{AxisRange, CellDetection, LimitExceeded, PointDetection};
use formats::{CellMaskSet, LayerConfig, decode_cell_masks};
use foundation::RoiId;
use geometry::{Ring, SelfIntersection};
use serde::Serialize;

/// Parses `MIN:MAX` (either order) into an inclusive range.
pub fn parse_range(raw: &str) -> Result<AxisRange, String> {
    let (a, b) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got {raw:?}"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| format!("{s:?} is not a number"))
    };
    Ok(AxisRange::new(parse(a)?, parse(b)?))
}

/// Reads the dataset layer configuration, or falls back to the defaults
/// with `layers` overridden when given.
pub fn load_layer_config(path: Option<&Path>, layers: Option<u8>) -> Result<LayerConfig> {
    let mut config = match path {
        Some(p) => {
            let raw = fs::read_to_string(p)
                .with_context(|| format!("reading layer config {}", p.display()))?;
            LayerConfig::from_json_str(&raw)
                .with_context(|| format!("parsing layer config {}", p.display()))?
        }
        None => LayerConfig::default(),
    };
    if let Some(layers) = layers {
        config.layers = layers;
    }
    Ok(config)
}

pub fn load_cell_masks(path: &Path) -> Result<CellMaskSet> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    decode_cell_masks(&bytes).with_context(|| format!("decoding {}", path.display()))
}

pub fn read_text(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if text.trim().is_empty() {
        bail!("{} is empty", path.display());
    }
    Ok(text)
}

/// Per-ROI line of `roi detect` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiReport {
    pub polygon_id: RoiId,
    pub point_count: usize,
    pub gene_distribution: Distribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_exceeded: Option<LimitExceeded>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_polygon_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_cluster_distribution: Option<Distribution>,
}

impl RoiReport {
    pub fn new(polygon_id: RoiId, points: &PointDetection, cells: Option<&CellDetection>) -> Self {
        Self {
            polygon_id,
            point_count: points.point_count,
            gene_distribution: points.gene_distribution.clone(),
            limit_exceeded: points.limit_exceeded,
            cell_polygon_count: cells.map(|c| c.cell_polygon_count),
            cell_cluster_distribution: cells.map(|c| c.cell_cluster_distribution.clone()),
        }
    }
}

/// Per-ROI line of `roi validate` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub polygon_id: RoiId,
    pub vertices: usize,
    #[serde(flatten)]
    pub self_intersection: SelfIntersection,
}

impl ValidationReport {
    pub fn new(polygon_id: RoiId, ring: &Ring) -> Self {
        Self {
            polygon_id,
            vertices: ring.len(),
            self_intersection: geometry::self_intersects(ring),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ranges_parse_in_either_order() {
        let r = parse_range("5:-1.5").unwrap();
        assert_eq!((r.min(), r.max()), (-1.5, 5.0));
        assert!(parse_range("5").is_err());
        assert!(parse_range("a:1").is_err());
    }

    #[test]
    fn layer_override_applies_to_defaults() {
        let c = load_layer_config(None, Some(3)).unwrap();
        assert_eq!(c.layers, 3);
        assert_eq!(c.tile_size, LayerConfig::default().tile_size);
    }

    #[test]
    fn layer_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer_config.json");
        fs::write(&path, r#"{"layers": 4, "tile_size": 256}"#).unwrap();
        let c = load_layer_config(Some(&path), None).unwrap();
        assert_eq!((c.layers, c.tile_size), (4, 256));
    }

    #[test]
    fn validation_flags_bowtie() {
        let bowtie = Ring::new(vec![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 10.0]]);
        let report = ValidationReport::new(RoiId::FIRST, &bowtie);
        assert!(report.self_intersection.has_intersection);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["hasIntersection"], true);
        assert_eq!(json["polygonId"], 1);
    }
}
