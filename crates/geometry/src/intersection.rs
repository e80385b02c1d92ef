use foundation::precision::{ORIENTATION_EPSILON, sign_with_tolerance};
use serde::{Deserialize, Serialize};

use crate::ring::{Ring, Vertex};

/// Outcome of a self-intersection check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfIntersection {
    pub has_intersection: bool,
    /// Edge indices of the first offending pair found. Edge `i` runs from
    /// vertex `i` to vertex `i + 1` (wrapping).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges: Option<(usize, usize)>,
}

/// Checks whether any two non-adjacent edges of `ring` cross or overlap.
///
/// Adjacent edges (including the pair joined by the wrap-around vertex) are
/// never compared, so shared endpoints are not reported. Collinear
/// overlapping edges are reported. The scan stops at the first hit.
///
/// Quadratic in the number of edges.
pub fn self_intersects(ring: &Ring) -> SelfIntersection {
    let edges: Vec<(usize, Vertex, Vertex)> = ring
        .edges()
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, (a, b))| (i, a, b))
        .collect();
    let n = ring.len();

    for (ai, &(i, p1, p2)) in edges.iter().enumerate() {
        for &(j, p3, p4) in &edges[ai + 1..] {
            if edges_adjacent(i, j, n) {
                continue;
            }
            if segments_intersect(p1, p2, p3, p4) {
                return SelfIntersection {
                    has_intersection: true,
                    edges: Some((i, j)),
                };
            }
        }
    }
    SelfIntersection::default()
}

fn edges_adjacent(i: usize, j: usize, n: usize) -> bool {
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
    hi - lo == 1 || (lo == 0 && hi == n - 1)
}

/// Orientation of `c` relative to the directed line `a -> b`.
fn orientation(a: Vertex, b: Vertex, c: Vertex) -> i8 {
    let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
    sign_with_tolerance(cross, ORIENTATION_EPSILON)
}

/// `p` lies within the bounding box of segment `a -> b`. Only meaningful when
/// `p` is already known to be collinear with the segment.
fn within_segment_box(a: Vertex, b: Vertex, p: Vertex) -> bool {
    p[0] >= a[0].min(b[0]) - ORIENTATION_EPSILON
        && p[0] <= a[0].max(b[0]) + ORIENTATION_EPSILON
        && p[1] >= a[1].min(b[1]) - ORIENTATION_EPSILON
        && p[1] <= a[1].max(b[1]) + ORIENTATION_EPSILON
}

pub fn segments_intersect(p1: Vertex, p2: Vertex, p3: Vertex, p4: Vertex) -> bool {
    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);

    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }

    (d1 == 0 && within_segment_box(p3, p4, p1))
        || (d2 == 0 && within_segment_box(p3, p4, p2))
        || (d3 == 0 && within_segment_box(p1, p2, p3))
        || (d4 == 0 && within_segment_box(p1, p2, p4))
}

#[cfg(test)]
mod tests {
    use super::{segments_intersect, self_intersects};
    use crate::ring::Ring;

    #[test]
    fn bowtie_intersects() {
        let ring = Ring::new(vec![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 10.0], [0.0, 0.0]]);
        let result = self_intersects(&ring);
        assert!(result.has_intersection);
        assert_eq!(result.edges, Some((1, 3)));
    }

    #[test]
    fn convex_polygons_do_not_intersect() {
        let square = Ring::new(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]);
        assert!(!self_intersects(&square).has_intersection);

        let hexagon: Vec<[f64; 2]> = (0..6)
            .map(|k| {
                let a = k as f64 * std::f64::consts::PI / 3.0;
                [a.cos() * 5.0, a.sin() * 5.0]
            })
            .collect();
        assert!(!self_intersects(&Ring::new(hexagon)).has_intersection);

        let triangle = Ring::new(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert!(!self_intersects(&triangle).has_intersection);
    }

    #[test]
    fn concave_ring_is_valid() {
        let ring = Ring::new(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [5.0, 4.0], [0.0, 10.0]]);
        assert!(!self_intersects(&ring).has_intersection);
    }

    #[test]
    fn collinear_overlap_is_flagged() {
        // Edge 0 runs (0,0)->(10,0); edge 3 doubles back along it.
        let ring = Ring::new(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [5.0, 0.0], [2.0, 0.0], [0.0, 5.0]]);
        assert!(self_intersects(&ring).has_intersection);
        assert!(segments_intersect([0.0, 0.0], [4.0, 0.0], [2.0, 0.0], [6.0, 0.0]));
    }

    #[test]
    fn disjoint_collinear_segments_do_not_intersect() {
        assert!(!segments_intersect([0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]));
    }

    #[test]
    fn parallel_segments_do_not_intersect() {
        assert!(!segments_intersect([0.0, 0.0], [10.0, 0.0], [0.0, 1.0], [10.0, 1.0]));
    }

    #[test]
    fn nearly_touching_within_epsilon_counts() {
        assert!(segments_intersect([0.0, 0.0], [10.0, 0.0], [5.0, 1e-12], [5.0, 5.0]));
    }
}
