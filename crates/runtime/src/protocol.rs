//! Messages crossing the worker boundary.
//!
//! Requests and responses are tagged by `type` with their data under
//! `payload`, and both carry the request id:
//!
//! ```text
//! { "id": 7, "type": "detectPointsInPolygon", "payload": { "polygon": [...], "files": [...], "layerConfig": {...} } }
//! { "id": 7, "type": "pointsDetected", "payload": { "success": true, "pointsInPolygon": [...], "pointCount": 3, ... } }
//! { "id": 8, "type": "error", "payload": { "success": false, "error": "..." } }
//! ```

use compute::{CellDetection, CellFilter, DetectionConfig, FilteredCells, PointDetection};
use formats::{CellMask, LayerConfig, TileFile};
use foundation::RequestId;
use geometry::Ring;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: RequestId,
    #[serde(flatten)]
    pub body: RequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum RequestBody {
    #[serde(rename_all = "camelCase")]
    DetectPointsInPolygon {
        polygon: Ring,
        files: Vec<TileFile>,
        layer_config: LayerConfig,
        #[serde(default)]
        config: DetectionConfig,
    },
    #[serde(rename_all = "camelCase")]
    DetectCellPolygonsInPolygon {
        polygon: Ring,
        cell_masks_data: Vec<CellMask>,
    },
    #[serde(rename_all = "camelCase")]
    FilterCells {
        cells_data: Vec<CellMask>,
        #[serde(default)]
        filter: CellFilter,
    },
}

impl RequestBody {
    /// Wire name of the request, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestBody::DetectPointsInPolygon { .. } => "detectPointsInPolygon",
            RequestBody::DetectCellPolygonsInPolygon { .. } => "detectCellPolygonsInPolygon",
            RequestBody::FilterCells { .. } => "filterCells",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "WireResponse", try_from = "WireResponse")]
pub struct WorkerResponse {
    pub id: RequestId,
    pub body: ResponseBody,
}

#[derive(Debug, Clone)]
pub enum ResponseBody {
    PointsDetected(PointDetection),
    CellPolygonsDetected(CellDetection),
    CellsFiltered(FilteredCells),
    Error { error: String },
    Cancelled,
}

impl ResponseBody {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseBody::PointsDetected(_) => "pointsDetected",
            ResponseBody::CellPolygonsDetected(_) => "cellPolygonsDetected",
            ResponseBody::CellsFiltered(_) => "cellsFiltered",
            ResponseBody::Error { .. } => "error",
            ResponseBody::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ResponseBody::Error { .. } | ResponseBody::Cancelled)
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    id: RequestId,
    #[serde(flatten)]
    body: WireBody,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
enum WireBody {
    PointsDetected(Reply<PointDetection>),
    CellPolygonsDetected(Reply<CellDetection>),
    CellsFiltered(Reply<FilteredCells>),
    Error(Reply<ErrorMessage>),
    Cancelled(Status),
}

/// Response payload: the `success` flag next to the result fields.
#[derive(Serialize, Deserialize)]
struct Reply<T> {
    success: bool,
    #[serde(flatten)]
    result: T,
}

#[derive(Serialize, Deserialize)]
struct ErrorMessage {
    error: String,
}

#[derive(Serialize, Deserialize)]
struct Status {
    success: bool,
}

impl From<WorkerResponse> for WireResponse {
    fn from(response: WorkerResponse) -> Self {
        let success = response.body.is_success();
        let body = match response.body {
            ResponseBody::PointsDetected(result) => WireBody::PointsDetected(Reply { success, result }),
            ResponseBody::CellPolygonsDetected(result) => {
                WireBody::CellPolygonsDetected(Reply { success, result })
            }
            ResponseBody::CellsFiltered(result) => WireBody::CellsFiltered(Reply { success, result }),
            ResponseBody::Error { error } => WireBody::Error(Reply {
                success,
                result: ErrorMessage { error },
            }),
            ResponseBody::Cancelled => WireBody::Cancelled(Status { success }),
        };
        WireResponse {
            id: response.id,
            body,
        }
    }
}

impl TryFrom<WireResponse> for WorkerResponse {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        let (success, body) = match wire.body {
            WireBody::PointsDetected(r) => (r.success, ResponseBody::PointsDetected(r.result)),
            WireBody::CellPolygonsDetected(r) => {
                (r.success, ResponseBody::CellPolygonsDetected(r.result))
            }
            WireBody::CellsFiltered(r) => (r.success, ResponseBody::CellsFiltered(r.result)),
            WireBody::Error(r) => (
                r.success,
                ResponseBody::Error {
                    error: r.result.error,
                },
            ),
            WireBody::Cancelled(s) => (s.success, ResponseBody::Cancelled),
        };
        if success != body.is_success() {
            return Err(format!("{} response with success: {success}", body.kind()));
        }
        Ok(WorkerResponse { id: wire.id, body })
    }
}
