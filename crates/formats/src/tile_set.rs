use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::tile_path::{TileCoord, TileFile};

#[derive(Debug, thiserror::Error)]
pub enum TileSetError {
    #[error("failed to walk {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loads every `{zoom}/{col}/{row}.bin` file below `root`.
///
/// File names are recorded relative to `root` with `/` separators, so they
/// satisfy the tile naming contract regardless of platform. Files that do not
/// match the contract are skipped, as are symlinks. Output is sorted by name.
pub fn load_tile_dir(root: impl AsRef<Path>) -> Result<Vec<TileFile>, TileSetError> {
    let root = root.as_ref();
    let mut out = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|source| TileSetError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if TileCoord::from_path(&name).is_none() {
            continue;
        }
        let bytes = fs::read(entry.path()).map_err(|source| TileSetError::Read {
            path: entry.path().to_path_buf(),
            source,
        })?;
        out.push(TileFile::new(name, bytes));
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(root = %root.display(), tiles = out.len(), "loaded tile directory");
    Ok(out)
}
