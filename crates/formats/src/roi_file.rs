//! ROI file import/export.
//!
//! Export writes a JSON array of `{ "polygonId": n, "coordinates": [[x, y], ...] }`
//! with closed rings. Import also accepts the older layout: a bare array of
//! coordinate rings without ids.

use foundation::ids::RoiId;
use geometry::{Ring, Vertex};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RoiFileError {
    #[error("ROI file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("ROI entry {index} has fewer than three vertices")]
    TooFewVertices { index: usize },
}

/// One polygon read from a ROI file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRoi {
    /// Id supplied by the file, kept only when it is a positive integer.
    pub requested_id: Option<RoiId>,
    pub ring: Ring,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoiRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    polygon_id: Option<serde_json::Value>,
    coordinates: Vec<Vertex>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoiEntry {
    Record(RoiRecord),
    Bare(Vec<Vertex>),
}

pub fn parse_roi_file(payload: &str) -> Result<Vec<ImportedRoi>, RoiFileError> {
    let entries: Vec<RoiEntry> = serde_json::from_str(payload)?;
    let mut out = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let (raw_id, coordinates) = match entry {
            RoiEntry::Record(r) => (r.polygon_id, r.coordinates),
            RoiEntry::Bare(c) => (None, c),
        };
        let ring = Ring::new(coordinates);
        if ring.is_degenerate() {
            return Err(RoiFileError::TooFewVertices { index });
        }
        let requested_id = raw_id.as_ref().and_then(|v| {
            let id = v.as_f64().and_then(RoiId::from_f64);
            if id.is_none() {
                debug!(index, value = %v, "ignoring invalid polygonId in ROI file");
            }
            id
        });
        out.push(ImportedRoi { requested_id, ring });
    }
    Ok(out)
}

pub fn write_roi_file<'a, I>(rois: I) -> Result<String, RoiFileError>
where
    I: IntoIterator<Item = (RoiId, &'a Ring)>,
{
    let records: Vec<RoiRecord> = rois
        .into_iter()
        .map(|(id, ring)| RoiRecord {
            polygon_id: Some(serde_json::Value::from(id.get())),
            coordinates: ring.to_closed_vec(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}
