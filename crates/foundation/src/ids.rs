use serde::{Deserialize, Serialize};

/// Identifier of a drawn region of interest (the `polygonId` of a ROI).
///
/// Ids are positive integers; zero is never a valid id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RoiId(u32);

impl RoiId {
    pub const FIRST: RoiId = RoiId(1);

    pub fn new(n: u32) -> Option<Self> {
        if n == 0 { None } else { Some(RoiId(n)) }
    }

    /// Accepts ids coming from untyped sources (imported files) and keeps only
    /// positive integers that fit in `u32`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if value.fract() != 0.0 || value < 1.0 || value > u32::MAX as f64 {
            return None;
        }
        Self::new(value as u32)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// The id that follows this one, or `None` at `u32::MAX`.
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(RoiId)
    }
}

impl std::fmt::Display for RoiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for RoiId {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        RoiId::new(n).ok_or_else(|| "polygon id must be positive".to_string())
    }
}

impl From<RoiId> for u32 {
    fn from(id: RoiId) -> u32 {
        id.0
    }
}

/// Correlation id attached to every worker request and echoed by its response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
