use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use compute::{
    AttributeRangeFilter, AxisRange, CellFilter, DetectionConfig, NameFilter,
    ProjectionRangeFilter, detect_cell_polygons_in_polygons, detect_points_in_polygons,
};
use formats::{load_tile_dir, parse_roi_file};
use foundation::CancelToken;
use geometry::Ring;
use runtime::{WorkerClient, WorkerConfig};
use scene::RoiStore;
use serde_json::json;
use tools::{
    RoiReport, ValidationReport, load_cell_masks, load_layer_config, parse_range, read_text,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Region-of-interest detection over transcript tiles and cell masks")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count transcript points (and cells) inside each ROI of a ROI file
    Detect {
        /// Directory holding `{zoom}/{col}/{row}.bin` tiles
        #[arg(long)]
        tiles: PathBuf,

        /// ROI file (JSON)
        #[arg(long)]
        rois: PathBuf,

        /// Segmentation file with cell masks
        #[arg(long)]
        cells: Option<PathBuf>,

        /// Dataset layer configuration (JSON)
        #[arg(long)]
        layer_config: Option<PathBuf>,

        /// Override the maximum zoom level
        #[arg(long)]
        layers: Option<u8>,

        /// Maximum transcript points per ROI
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Report self-intersecting polygons in a ROI file
    Validate {
        #[arg(long)]
        rois: PathBuf,
    },

    /// Split cell masks into kept cells and outliers
    Filter {
        #[arg(long)]
        cells: PathBuf,

        /// Comma-separated cluster ids to keep (default: all)
        #[arg(long, value_delimiter = ',')]
        names: Vec<String>,

        #[arg(long, requires = "attr_y")]
        attr_x: Option<String>,

        #[arg(long, requires = "attr_x")]
        attr_y: Option<String>,

        /// Attribute range on the x axis, MIN:MAX
        #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
        x: Option<AxisRange>,

        /// Attribute range on the y axis, MIN:MAX
        #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
        y: Option<AxisRange>,

        /// Projection range on the x axis, MIN:MAX
        #[arg(long, value_parser = parse_range, allow_hyphen_values = true, requires = "umap_y")]
        umap_x: Option<AxisRange>,

        /// Projection range on the y axis, MIN:MAX
        #[arg(long, value_parser = parse_range, allow_hyphen_values = true, requires = "umap_x")]
        umap_y: Option<AxisRange>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Detect {
            tiles,
            rois,
            cells,
            layer_config,
            layers,
            limit,
        } => detect(tiles, rois, cells, layer_config, layers, limit)?,
        Command::Validate { rois } => validate(rois)?,
        Command::Filter {
            cells,
            names,
            attr_x,
            attr_y,
            x,
            y,
            umap_x,
            umap_y,
        } => {
            let names = if names.is_empty() || names.iter().any(|n| n == "all") {
                NameFilter::All
            } else {
                NameFilter::Only(names)
            };
            let attribute_range = match (attr_x, attr_y, x, y) {
                (Some(x_attribute), Some(y_attribute), Some(x), Some(y)) => {
                    Some(AttributeRangeFilter {
                        x_attribute,
                        y_attribute,
                        x,
                        y,
                    })
                }
                (None, None, None, None) => None,
                _ => bail!("--attr-x, --attr-y, --x and --y must be given together"),
            };
            let projection_range = match (umap_x, umap_y) {
                (Some(x), Some(y)) => Some(ProjectionRangeFilter { x, y }),
                _ => None,
            };
            let filter = CellFilter {
                names,
                attribute_range,
                projection_range,
            };
            filter_cells(cells, filter).await?
        }
    }
    Ok(())
}

fn load_store(path: &Path) -> Result<RoiStore> {
    let text = read_text(path)?;
    let imported =
        parse_roi_file(&text).with_context(|| format!("parsing ROI file {}", path.display()))?;
    let mut store = RoiStore::new();
    store.import(imported);
    Ok(store)
}

fn detect(
    tiles: PathBuf,
    rois: PathBuf,
    cells: Option<PathBuf>,
    layer_config: Option<PathBuf>,
    layers: Option<u8>,
    limit: Option<usize>,
) -> Result<()> {
    let layer_config = load_layer_config(layer_config.as_deref(), layers)?;
    let mut config = DetectionConfig::from_env();
    if let Some(limit) = limit {
        config.max_transcript_points = limit;
    }

    let store = load_store(&rois)?;
    let files = load_tile_dir(&tiles)?;
    let masks = cells.as_deref().map(load_cell_masks).transpose()?;
    info!(
        rois = store.len(),
        tiles = files.len(),
        cells = masks.as_ref().map(|m| m.masks.len()),
        zoom = layer_config.layers,
        "detecting"
    );

    let ids = store.ids();
    let rings: Vec<Ring> = store.iter().map(|f| f.ring.clone()).collect();
    let cancel = CancelToken::new();
    let points = detect_points_in_polygons(&rings, &files, &layer_config, &config, &cancel)
        .context("point detection")?;
    let cell_results = match &masks {
        Some(set) => Some(
            detect_cell_polygons_in_polygons(&rings, &set.masks, &cancel)
                .context("cell detection")?,
        ),
        None => None,
    };

    let mut reports = Vec::with_capacity(ids.len());
    for (i, (id, points)) in ids.into_iter().zip(&points).enumerate() {
        let cells = cell_results.as_ref().and_then(|c| c.get(i));
        if let Some(exceeded) = points.limit_exceeded {
            warn!(
                roi = %id,
                found = exceeded.total_points_found,
                "ROI exceeds the point limit; shrink it by {}%",
                exceeded.suggested_reduction_percent
            );
        }
        reports.push(RoiReport::new(id, points, cells));
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn validate(rois: PathBuf) -> Result<()> {
    let store = load_store(&rois)?;
    let reports: Vec<ValidationReport> = store
        .iter()
        .map(|f| ValidationReport::new(f.polygon_id, &f.ring))
        .collect();
    let invalid = reports
        .iter()
        .filter(|r| r.self_intersection.has_intersection)
        .count();
    if invalid > 0 {
        warn!(invalid, "self-intersecting polygons found");
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

async fn filter_cells(cells: PathBuf, filter: CellFilter) -> Result<()> {
    let set = load_cell_masks(&cells)?;
    let client = WorkerClient::new(WorkerConfig::from_env());
    let total = set.masks.len();
    let out = client.filter_cells(set.masks, filter)?.await?;
    client.terminate();

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "total": total,
            "kept": out.unselected_cells_data.len(),
            "outliers": out.outlier_cells_data.len(),
        }))?
    );
    Ok(())
}
