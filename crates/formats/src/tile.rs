//! Transcript tile codec.
//!
//! One `.bin` file holds one protobuf `TileData` message:
//!
//! ```text
//! message PointData { repeated double position = 1 [packed]; repeated uint32 color = 2 [packed];
//!                     string geneName = 3; string cellId = 4; }
//! message TileData  { repeated PointData pointsData = 1; uint32 numberOfPoints = 2; }
//! ```

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::tile_path::TileCoord;

#[derive(Clone, PartialEq, prost::Message)]
pub struct PointDataMessage {
    #[prost(double, repeated, tag = "1")]
    pub position: Vec<f64>,
    #[prost(uint32, repeated, tag = "2")]
    pub color: Vec<u32>,
    #[prost(string, tag = "3")]
    pub gene_name: String,
    #[prost(string, tag = "4")]
    pub cell_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TileDataMessage {
    #[prost(message, repeated, tag = "1")]
    pub points_data: Vec<PointDataMessage>,
    #[prost(uint32, tag = "2")]
    pub number_of_points: u32,
}

/// A decoded transcript point. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPoint {
    pub x: f64,
    pub y: f64,
    /// Display color, not used by detection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub color: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
}

impl TranscriptPoint {
    pub fn new(x: f64, y: f64, gene_name: impl Into<String>) -> Self {
        let gene_name = gene_name.into();
        Self {
            x,
            y,
            color: Vec::new(),
            gene_name: (!gene_name.is_empty()).then_some(gene_name),
            cell_id: None,
        }
    }

    pub fn position(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub coord: TileCoord,
    pub points: Vec<TranscriptPoint>,
    /// Count declared by the tile itself; may disagree with `points.len()`
    /// for malformed tiles.
    pub number_of_points: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to decode tile {coord}: {source}")]
pub struct TileDecodeError {
    pub coord: TileCoord,
    #[source]
    pub source: prost::DecodeError,
}

/// Decodes one tile payload. Points with fewer than two position components
/// are dropped.
pub fn decode_tile(coord: TileCoord, bytes: &[u8]) -> Result<Tile, TileDecodeError> {
    let message =
        TileDataMessage::decode(bytes).map_err(|source| TileDecodeError { coord, source })?;

    let points = message
        .points_data
        .into_iter()
        .filter_map(|p| {
            if p.position.len() < 2 {
                return None;
            }
            Some(TranscriptPoint {
                x: p.position[0],
                y: p.position[1],
                color: p.color,
                gene_name: non_empty(p.gene_name),
                cell_id: non_empty(p.cell_id),
            })
        })
        .collect();

    Ok(Tile {
        coord,
        points,
        number_of_points: message.number_of_points,
    })
}

/// Encodes points into a tile payload.
pub fn encode_tile(points: &[TranscriptPoint]) -> Vec<u8> {
    let message = TileDataMessage {
        points_data: points
            .iter()
            .map(|p| PointDataMessage {
                position: vec![p.x, p.y],
                color: p.color.clone(),
                gene_name: p.gene_name.clone().unwrap_or_default(),
                cell_id: p.cell_id.clone().unwrap_or_default(),
            })
            .collect(),
        number_of_points: points.len() as u32,
    };
    message.encode_to_vec()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_encoded_points() {
        let mut with_cell = TranscriptPoint::new(3.0, 4.0, "Actb");
        with_cell.cell_id = Some("cell-9".to_string());
        with_cell.color = vec![255, 0, 0];
        let points = vec![TranscriptPoint::new(1.5, 2.5, "Gapdh"), with_cell];

        let bytes = encode_tile(&points);
        let tile = decode_tile(TileCoord::new(2, 0, 0), &bytes).unwrap();
        assert_eq!(tile.points, points);
        assert_eq!(tile.number_of_points, 2);
    }

    #[test]
    fn empty_payload_is_an_empty_tile() {
        let tile = decode_tile(TileCoord::new(0, 0, 0), &[]).unwrap();
        assert!(tile.points.is_empty());
    }

    #[test]
    fn drops_points_without_full_position() {
        let message = TileDataMessage {
            points_data: vec![
                PointDataMessage {
                    position: vec![1.0],
                    ..Default::default()
                },
                PointDataMessage {
                    position: vec![1.0, 2.0, 3.0],
                    gene_name: String::new(),
                    ..Default::default()
                },
            ],
            number_of_points: 2,
        };
        let tile = decode_tile(TileCoord::new(1, 0, 0), &message.encode_to_vec()).unwrap();
        assert_eq!(tile.points.len(), 1);
        assert_eq!(tile.points[0].gene_name, None);
    }

    #[test]
    fn garbage_is_an_error_naming_the_tile() {
        let err = decode_tile(TileCoord::new(3, 1, 2), &[0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(err.to_string().contains("3/1/2"));
    }
}
