//! Cell segmentation codec.
//!
//! ```text
//! message UmapEntry     { double umapX = 1; double umapY = 2; }
//! message SingleMask    { repeated double vertices = 1 [packed]; repeated uint32 color = 2 [packed];
//!                         string area = 3; string totalCounts = 4; string totalGenes = 5;
//!                         string cellId = 6; string clusterId = 7;
//!                         repeated float proteinValues = 8 [packed]; UmapEntry umapValues = 9; }
//! message ColormapEntry { string clusterId = 1; repeated uint32 color = 2 [packed]; }
//! message Metadata      { repeated string proteinNames = 1; repeated string geneNames = 2; }
//! message CellMasks     { repeated SingleMask cellMasks = 1; repeated ColormapEntry colormap = 2;
//!                         uint32 numberOfCells = 3; Metadata metadata = 4; }
//! ```
//!
//! `proteinValues` is positional: entry `i` is the intensity of
//! `metadata.proteinNames[i]`.

use std::collections::BTreeMap;

use prost::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, PartialEq, prost::Message)]
pub struct UmapEntryMessage {
    #[prost(double, tag = "1")]
    pub umap_x: f64,
    #[prost(double, tag = "2")]
    pub umap_y: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SingleMaskMessage {
    #[prost(double, repeated, tag = "1")]
    pub vertices: Vec<f64>,
    #[prost(uint32, repeated, tag = "2")]
    pub color: Vec<u32>,
    #[prost(string, tag = "3")]
    pub area: String,
    #[prost(string, tag = "4")]
    pub total_counts: String,
    #[prost(string, tag = "5")]
    pub total_genes: String,
    #[prost(string, tag = "6")]
    pub cell_id: String,
    #[prost(string, tag = "7")]
    pub cluster_id: String,
    #[prost(float, repeated, tag = "8")]
    pub protein_values: Vec<f32>,
    #[prost(message, optional, tag = "9")]
    pub umap_values: Option<UmapEntryMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ColormapEntryMessage {
    #[prost(string, tag = "1")]
    pub cluster_id: String,
    #[prost(uint32, repeated, tag = "2")]
    pub color: Vec<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MetadataMessage {
    #[prost(string, repeated, tag = "1")]
    pub protein_names: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub gene_names: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CellMasksMessage {
    #[prost(message, repeated, tag = "1")]
    pub cell_masks: Vec<SingleMaskMessage>,
    #[prost(message, repeated, tag = "2")]
    pub colormap: Vec<ColormapEntryMessage>,
    #[prost(uint32, tag = "3")]
    pub number_of_cells: u32,
    #[prost(message, optional, tag = "4")]
    pub metadata: Option<MetadataMessage>,
}

/// One segmented cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMask {
    pub cell_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Flat `[x0, y0, x1, y1, ...]` outline.
    pub vertices: Vec<f64>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub total_counts: Option<f64>,
    #[serde(default)]
    pub total_genes: Option<f64>,
    #[serde(default)]
    pub proteins: BTreeMap<String, f64>,
    /// 2D embedding coordinate used by projection filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub umap: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub color: Vec<u32>,
}

impl CellMask {
    pub fn new(cell_id: impl Into<String>, cluster_id: impl Into<String>, vertices: Vec<f64>) -> Self {
        let cluster_id = cluster_id.into();
        Self {
            cell_id: cell_id.into(),
            cluster_id: (!cluster_id.is_empty()).then_some(cluster_id),
            vertices,
            area: None,
            total_counts: None,
            total_genes: None,
            proteins: BTreeMap::new(),
            umap: None,
            color: Vec::new(),
        }
    }

    /// Looks up a numeric attribute by name: protein intensities first, then
    /// the built-in `area`, `totalCounts` and `totalGenes`.
    pub fn attribute(&self, name: &str) -> Option<f64> {
        if let Some(v) = self.proteins.get(name) {
            return Some(*v);
        }
        match name {
            "area" => self.area,
            "totalCounts" | "total_counts" => self.total_counts,
            "totalGenes" | "total_genes" => self.total_genes,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColormapEntry {
    pub cluster_id: String,
    pub color: Vec<u32>,
}

/// A decoded segmentation file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMaskSet {
    pub masks: Vec<CellMask>,
    #[serde(default)]
    pub colormap: Vec<ColormapEntry>,
    #[serde(default)]
    pub protein_names: Vec<String>,
    #[serde(default)]
    pub gene_names: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to decode cell masks: {0}")]
pub struct CellMasksDecodeError(#[from] pub prost::DecodeError);

pub fn decode_cell_masks(bytes: &[u8]) -> Result<CellMaskSet, CellMasksDecodeError> {
    let message = CellMasksMessage::decode(bytes)?;
    let metadata = message.metadata.unwrap_or_default();

    let masks = message
        .cell_masks
        .into_iter()
        .map(|m| mask_from_message(m, &metadata.protein_names))
        .collect();

    Ok(CellMaskSet {
        masks,
        colormap: message
            .colormap
            .into_iter()
            .map(|c| ColormapEntry {
                cluster_id: c.cluster_id,
                color: c.color,
            })
            .collect(),
        protein_names: metadata.protein_names,
        gene_names: metadata.gene_names,
    })
}

fn mask_from_message(m: SingleMaskMessage, protein_names: &[String]) -> CellMask {
    if m.protein_values.len() != protein_names.len() && !m.protein_values.is_empty() {
        debug!(
            cell_id = %m.cell_id,
            values = m.protein_values.len(),
            names = protein_names.len(),
            "protein value count does not match metadata; extra entries ignored"
        );
    }
    let proteins = protein_names
        .iter()
        .zip(m.protein_values.iter())
        .map(|(name, v)| (name.clone(), *v as f64))
        .collect();

    CellMask {
        area: parse_attribute(&m.area),
        total_counts: parse_attribute(&m.total_counts),
        total_genes: parse_attribute(&m.total_genes),
        cluster_id: (!m.cluster_id.is_empty()).then_some(m.cluster_id),
        cell_id: m.cell_id,
        vertices: m.vertices,
        proteins,
        umap: m.umap_values.map(|u| [u.umap_x, u.umap_y]),
        color: m.color,
    }
}

fn parse_attribute(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn encode_cell_masks(set: &CellMaskSet) -> Vec<u8> {
    let message = CellMasksMessage {
        cell_masks: set
            .masks
            .iter()
            .map(|m| SingleMaskMessage {
                vertices: m.vertices.clone(),
                color: m.color.clone(),
                area: m.area.map(|v| v.to_string()).unwrap_or_default(),
                total_counts: m.total_counts.map(|v| v.to_string()).unwrap_or_default(),
                total_genes: m.total_genes.map(|v| v.to_string()).unwrap_or_default(),
                cell_id: m.cell_id.clone(),
                cluster_id: m.cluster_id.clone().unwrap_or_default(),
                protein_values: set
                    .protein_names
                    .iter()
                    .map(|name| m.proteins.get(name).copied().unwrap_or(0.0) as f32)
                    .collect(),
                umap_values: m.umap.map(|[x, y]| UmapEntryMessage {
                    umap_x: x,
                    umap_y: y,
                }),
            })
            .collect(),
        colormap: set
            .colormap
            .iter()
            .map(|c| ColormapEntryMessage {
                cluster_id: c.cluster_id.clone(),
                color: c.color.clone(),
            })
            .collect(),
        number_of_cells: set.masks.len() as u32,
        metadata: Some(MetadataMessage {
            protein_names: set.protein_names.clone(),
            gene_names: set.gene_names.clone(),
        }),
    };
    message.encode_to_vec()
}
