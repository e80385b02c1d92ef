use foundation::bounds::Aabb2;
use serde::{Deserialize, Serialize};

pub type Vertex = [f64; 2];

/// A closed polygon ring.
///
/// The closing edge is implicit: the last vertex connects back to the first.
/// Construction drops an explicit duplicate closing vertex and collapses
/// consecutive duplicate vertices, so every stored edge has non-zero length.
///
/// Serializes as a plain array of `[x, y]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Vertex>", into = "Vec<Vertex>")]
pub struct Ring {
    vertices: Vec<Vertex>,
    bounds: Option<Aabb2>,
    distinct: usize,
}

impl Ring {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        let mut out: Vec<Vertex> = Vec::with_capacity(vertices.len());
        for v in vertices {
            if out.last() != Some(&v) {
                out.push(v);
            }
        }
        while out.len() > 1 && out.first() == out.last() {
            out.pop();
        }

        let bounds = Aabb2::from_points(out.iter().copied());
        let distinct = count_distinct(&out);
        Self {
            vertices: out,
            bounds,
            distinct,
        }
    }

    /// Builds a ring from a flat `[x0, y0, x1, y1, ...]` array. A trailing odd
    /// value is ignored.
    pub fn from_flat(coords: &[f64]) -> Self {
        Self::new(coords.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Fewer than three distinct vertices: encloses no area.
    pub fn is_degenerate(&self) -> bool {
        self.distinct < 3
    }

    pub fn bounds(&self) -> Option<Aabb2> {
        self.bounds
    }

    /// Edges in ring order, including the wrap-around edge from the last
    /// vertex back to the first.
    pub fn edges(&self) -> impl Iterator<Item = (Vertex, Vertex)> + '_ {
        let n = self.vertices.len();
        let count = if n < 2 { 0 } else { n };
        (0..count).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Vertex list with the first vertex repeated at the end, the form used by
    /// GeoJSON-style polygon files.
    pub fn to_closed_vec(&self) -> Vec<Vertex> {
        let mut out = self.vertices.clone();
        if let Some(first) = self.vertices.first() {
            out.push(*first);
        }
        out
    }
}

impl From<Vec<Vertex>> for Ring {
    fn from(vertices: Vec<Vertex>) -> Self {
        Ring::new(vertices)
    }
}

impl From<Ring> for Vec<Vertex> {
    fn from(ring: Ring) -> Self {
        ring.vertices
    }
}

fn count_distinct(vertices: &[Vertex]) -> usize {
    let mut seen: Vec<Vertex> = Vec::new();
    for v in vertices {
        if !seen.contains(v) {
            seen.push(*v);
            if seen.len() >= 3 {
                break;
            }
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::Ring;

    #[test]
    fn drops_explicit_closing_vertex() {
        let ring = Ring::new(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.edges().count(), 4);
        assert_eq!(ring.to_closed_vec().len(), 5);
    }

    #[test]
    fn collapses_repeated_vertices() {
        let ring = Ring::new(vec![[0.0, 0.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0]]);
        assert_eq!(ring.vertices(), &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]);
        assert!(!ring.is_degenerate());
    }

    #[test]
    fn degenerate_rings() {
        assert!(Ring::new(vec![]).is_degenerate());
        assert!(Ring::new(vec![[0.0, 0.0], [1.0, 1.0]]).is_degenerate());
        assert!(Ring::new(vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0], [1.0, 1.0]]).is_degenerate());
        assert_eq!(Ring::new(vec![]).edges().count(), 0);
    }

    #[test]
    fn flat_coordinates() {
        let ring = Ring::from_flat(&[0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 9.0]);
        assert_eq!(ring.len(), 3);
        let b = ring.bounds().unwrap();
        assert_eq!(b.max, [2.0, 2.0]);
    }

    #[test]
    fn serializes_as_coordinate_array() {
        let ring = Ring::new(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]);
        let json = serde_json::to_string(&ring).unwrap();
        assert_eq!(json, "[[0.0,0.0],[1.0,0.0],[1.0,1.0]]");
        let back: Ring = serde_json::from_str("[[0,0],[1,0],[1,1],[0,0]]").unwrap();
        assert_eq!(back, ring);
    }
}
