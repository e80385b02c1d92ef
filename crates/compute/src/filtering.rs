//! Partitioning of a cell-mask set by name and range filters.

use formats::CellMask;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sentinel accepted on the wire in place of a name list.
pub const ALL_NAMES: &str = "all";

/// Allow-list on the cell's cluster id.
///
/// Serialized as the string `"all"` or as a list of names. An empty list is
/// inactive and lets every cell through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NameFilterRepr", into = "NameFilterRepr")]
pub enum NameFilter {
    #[default]
    All,
    Only(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum NameFilterRepr {
    Sentinel(String),
    Names(Vec<String>),
}

impl TryFrom<NameFilterRepr> for NameFilter {
    type Error = String;

    fn try_from(repr: NameFilterRepr) -> Result<Self, Self::Error> {
        match repr {
            NameFilterRepr::Sentinel(s) if s == ALL_NAMES => Ok(NameFilter::All),
            NameFilterRepr::Sentinel(s) => {
                Err(format!("expected \"{ALL_NAMES}\" or a list of names, got {s:?}"))
            }
            NameFilterRepr::Names(names) => Ok(NameFilter::Only(names)),
        }
    }
}

impl From<NameFilter> for NameFilterRepr {
    fn from(filter: NameFilter) -> Self {
        match filter {
            NameFilter::All => NameFilterRepr::Sentinel(ALL_NAMES.to_string()),
            NameFilter::Only(names) => NameFilterRepr::Names(names),
        }
    }
}

impl NameFilter {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameFilter::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn is_active(&self) -> bool {
        matches!(self, NameFilter::Only(names) if !names.is_empty())
    }

    pub fn accepts(&self, cluster_id: Option<&str>) -> bool {
        match self {
            NameFilter::All => true,
            NameFilter::Only(names) if names.is_empty() => true,
            NameFilter::Only(names) => {
                cluster_id.is_some_and(|id| names.iter().any(|n| n == id))
            }
        }
    }
}

/// Inclusive interval on one axis. Bounds are reordered on construction so
/// `min <= max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct AxisRange {
    min: f64,
    max: f64,
}

impl AxisRange {
    pub fn new(a: f64, b: f64) -> Self {
        if b < a {
            Self { min: b, max: a }
        } else {
            Self { min: a, max: b }
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// NaN is never contained.
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

impl From<[f64; 2]> for AxisRange {
    fn from([a, b]: [f64; 2]) -> Self {
        Self::new(a, b)
    }
}

impl From<AxisRange> for [f64; 2] {
    fn from(r: AxisRange) -> Self {
        [r.min, r.max]
    }
}

/// Rectangle over two named numeric attributes (protein intensities or the
/// built-in `area`, `totalCounts`, `totalGenes`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRangeFilter {
    pub x_attribute: String,
    pub y_attribute: String,
    pub x: AxisRange,
    pub y: AxisRange,
}

impl AttributeRangeFilter {
    /// A cell missing either attribute does not match.
    pub fn accepts(&self, cell: &CellMask) -> bool {
        match (
            cell.attribute(&self.x_attribute),
            cell.attribute(&self.y_attribute),
        ) {
            (Some(x), Some(y)) => self.x.contains(x) && self.y.contains(y),
            _ => false,
        }
    }
}

/// Rectangle over the cell's 2D projection coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRangeFilter {
    pub x: AxisRange,
    pub y: AxisRange,
}

impl ProjectionRangeFilter {
    pub fn accepts(&self, cell: &CellMask) -> bool {
        cell.umap
            .is_some_and(|[x, y]| self.x.contains(x) && self.y.contains(y))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellFilter {
    #[serde(default)]
    pub names: NameFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_range: Option<AttributeRangeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection_range: Option<ProjectionRangeFilter>,
}

impl CellFilter {
    pub fn accepts(&self, cell: &CellMask) -> bool {
        self.names.accepts(cell.cluster_id.as_deref())
            && self.attribute_range.as_ref().is_none_or(|f| f.accepts(cell))
            && self.projection_range.as_ref().is_none_or(|f| f.accepts(cell))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredCells {
    pub unselected_cells_data: Vec<CellMask>,
    pub outlier_cells_data: Vec<CellMask>,
}

impl FilteredCells {
    /// Every cell kept, no outliers. Used when filtering cannot run.
    pub fn passthrough(masks: &[CellMask]) -> Self {
        Self {
            unselected_cells_data: masks.to_vec(),
            outlier_cells_data: Vec::new(),
        }
    }
}

/// Splits `masks` into cells matching every active filter and outliers.
/// Input order is preserved within each side.
pub fn filter_cells(masks: &[CellMask], filter: &CellFilter) -> FilteredCells {
    let (unselected_cells_data, outlier_cells_data): (Vec<_>, Vec<_>) = masks
        .iter()
        .cloned()
        .partition(|cell| filter.accepts(cell));
    debug!(
        kept = unselected_cells_data.len(),
        outliers = outlier_cells_data.len(),
        "filtered cells"
    );
    FilteredCells {
        unselected_cells_data,
        outlier_cells_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(cells: &[CellMask]) -> Vec<&str> {
        cells.iter().map(|c| c.cell_id.as_str()).collect()
    }

    fn masks() -> Vec<CellMask> {
        let mut a = CellMask::new("a", "A", vec![]);
        a.proteins.insert("CD3".into(), 5.0);
        a.area = Some(10.0);
        a.umap = Some([0.5, 0.5]);
        let mut b = CellMask::new("b", "B", vec![]);
        b.proteins.insert("CD3".into(), 50.0);
        b.area = Some(10.0);
        b.umap = Some([3.0, 3.0]);
        let c = CellMask::new("c", "C", vec![]);
        vec![a, b, c]
    }

    #[test]
    fn name_filter_moves_other_clusters_to_outliers() {
        let filter = CellFilter {
            names: NameFilter::only(["A", "B"]),
            ..CellFilter::default()
        };
        let out = filter_cells(&masks(), &filter);
        assert_eq!(ids(&out.unselected_cells_data), vec!["a", "b"]);
        assert_eq!(ids(&out.outlier_cells_data), vec!["c"]);
    }

    #[test]
    fn all_and_empty_lists_pass_everything() {
        for names in [NameFilter::All, NameFilter::Only(vec![])] {
            let out = filter_cells(
                &masks(),
                &CellFilter {
                    names,
                    ..CellFilter::default()
                },
            );
            assert_eq!(out.unselected_cells_data.len(), 3);
            assert!(out.outlier_cells_data.is_empty());
        }
    }

    #[test]
    fn range_failures_become_outliers() {
        let filter = CellFilter {
            attribute_range: Some(AttributeRangeFilter {
                x_attribute: "CD3".into(),
                y_attribute: "area".into(),
                x: AxisRange::new(10.0, 0.0),
                y: AxisRange::new(0.0, 20.0),
            }),
            ..CellFilter::default()
        };
        let out = filter_cells(&masks(), &filter);
        assert_eq!(ids(&out.unselected_cells_data), vec!["a"]);
        assert_eq!(ids(&out.outlier_cells_data), vec!["b", "c"]);
    }

    #[test]
    fn projection_range_uses_umap_coordinate() {
        let filter = CellFilter {
            projection_range: Some(ProjectionRangeFilter {
                x: AxisRange::new(0.0, 1.0),
                y: AxisRange::new(0.0, 1.0),
            }),
            ..CellFilter::default()
        };
        let out = filter_cells(&masks(), &filter);
        assert_eq!(ids(&out.unselected_cells_data), vec!["a"]);
    }

    #[test]
    fn axis_range_is_inclusive_and_rejects_nan() {
        let r = AxisRange::new(2.0, 1.0);
        assert_eq!((r.min(), r.max()), (1.0, 2.0));
        assert!(r.contains(1.0) && r.contains(2.0));
        assert!(!r.contains(f64::NAN));
    }

    #[test]
    fn name_filter_wire_format() {
        let all: NameFilter = serde_json::from_str(r#""all""#).unwrap();
        assert_eq!(all, NameFilter::All);
        let some: NameFilter = serde_json::from_str(r#"["A","B"]"#).unwrap();
        assert_eq!(some, NameFilter::only(["A", "B"]));
        assert!(serde_json::from_str::<NameFilter>(r#""some""#).is_err());
        assert_eq!(serde_json::to_string(&NameFilter::All).unwrap(), r#""all""#);
    }
}
