use serde::{Deserialize, Serialize};

/// Dataset-level tiling configuration, as shipped next to the transcript
/// tiles.
///
/// `layers` is the deepest zoom level: the only level at which every point is
/// present. Shallower levels are decimated overviews for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub layer_width: u32,
    pub layer_height: u32,
    pub layers: u8,
    pub tile_size: u32,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            layer_width: 16_000,
            layer_height: 15_232,
            layers: 6,
            tile_size: 4_096,
        }
    }
}

impl LayerConfig {
    pub fn with_layers(layers: u8) -> Self {
        Self {
            layers,
            ..Self::default()
        }
    }

    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Zoom level that detection must read.
    pub fn detection_zoom(&self) -> u8 {
        self.layers
    }
}
