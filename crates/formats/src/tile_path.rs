use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::layer_config::LayerConfig;

/// Tile address in the transcript pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub col: u32,
    pub row: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, col: u32, row: u32) -> Self {
        Self { zoom, col, row }
    }

    /// Parses the `{zoom}/{col}/{row}.bin` suffix of a tile file name.
    ///
    /// Anything before the suffix is ignored. Backslash separators are
    /// accepted.
    pub fn from_path(name: &str) -> Option<Self> {
        let normalized = name.replace('\\', "/");
        let stem = normalized.strip_suffix(".bin")?;
        let mut parts = stem.rsplitn(4, '/');
        let row = parse_digits::<u32>(parts.next()?)?;
        let col = parse_digits::<u32>(parts.next()?)?;
        let zoom = parse_digits::<u8>(parts.next()?)?;
        Some(Self { zoom, col, row })
    }

    pub fn path(&self) -> String {
        format!("{}/{}/{}.bin", self.zoom, self.col, self.row)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// One addressable tile file: its name (used for addressing) and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileFile {
    pub name: String,
    pub bytes: Bytes,
}

impl TileFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn coord(&self) -> Option<TileCoord> {
        TileCoord::from_path(&self.name)
    }
}

/// A tile file that passed the locator, paired with its parsed address.
#[derive(Debug, Clone, Copy)]
pub struct LocatedTile<'a> {
    pub coord: TileCoord,
    pub file: &'a TileFile,
}

/// Selects the tiles that detection reads: names must match
/// `{zoom}/{col}/{row}.bin` and `zoom` must equal the configured maximum
/// level. Input order is preserved.
pub fn select_detection_tiles<'a>(
    files: &'a [TileFile],
    layer_config: &LayerConfig,
) -> Vec<LocatedTile<'a>> {
    let zoom = layer_config.detection_zoom();
    files
        .iter()
        .filter_map(|file| {
            let coord = file.coord()?;
            (coord.zoom == zoom).then_some(LocatedTile { coord, file })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{TileCoord, TileFile, select_detection_tiles};
    use crate::layer_config::LayerConfig;
    use bytes::Bytes;

    #[test]
    fn parses_suffix() {
        assert_eq!(
            TileCoord::from_path("dataset/transcripts/6/12/3.bin"),
            Some(TileCoord::new(6, 12, 3))
        );
        assert_eq!(TileCoord::from_path("2/0/1.bin"), Some(TileCoord::new(2, 0, 1)));
        assert_eq!(
            TileCoord::from_path(r"C:\data\3\4\5.bin"),
            Some(TileCoord::new(3, 4, 5))
        );
    }

    #[test]
    fn rejects_other_names() {
        assert_eq!(TileCoord::from_path("2/0/1.json"), None);
        assert_eq!(TileCoord::from_path("0/1.bin"), None);
        assert_eq!(TileCoord::from_path("a/0/1.bin"), None);
        assert_eq!(TileCoord::from_path("2/-1/1.bin"), None);
        assert_eq!(TileCoord::from_path("999/0/1.bin"), None);
        assert_eq!(TileCoord::from_path("metadata.bin"), None);
    }

    #[test]
    fn selects_only_configured_zoom() {
        let files = vec![
            TileFile::new("2/0/0.bin", Bytes::new()),
            TileFile::new("2/1/0.bin", Bytes::new()),
            TileFile::new("1/0/0.bin", Bytes::new()),
            TileFile::new("config.json", Bytes::new()),
        ];
        let selected = select_detection_tiles(&files, &LayerConfig::with_layers(2));
        let names: Vec<_> = selected.iter().map(|t| t.file.name.as_str()).collect();
        assert_eq!(names, vec!["2/0/0.bin", "2/1/0.bin"]);
        assert!(selected.iter().all(|t| t.coord.zoom == 2));
    }

    #[test]
    fn path_round_trips_display() {
        let c = TileCoord::new(4, 7, 9);
        assert_eq!(c.path(), "4/7/9.bin");
        assert_eq!(c.to_string(), "4/7/9");
        assert_eq!(TileCoord::from_path(&c.path()), Some(c));
    }
}
