use crate::ring::{Ring, Vertex};

/// Point-in-polygon test.
///
/// Rejects points outside the ring's bounding box first, then runs the
/// even-odd ray-casting rule over every edge. Degenerate rings contain nothing.
/// Points exactly on an edge may land on either side.
pub fn point_in_polygon(point: Vertex, ring: &Ring) -> bool {
    if ring.is_degenerate() {
        return false;
    }
    match ring.bounds() {
        Some(b) if b.contains(point) => {}
        _ => return false,
    }
    ray_cast(point, ring.vertices())
}

fn ray_cast(point: Vertex, vertices: &[Vertex]) -> bool {
    let [x, y] = point;
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let [xi, yi] = vertices[i];
        let [xj, yj] = vertices[j];
        // Edge straddles the horizontal line through the point, and the
        // crossing lies to the right of it.
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Cell-in-polygon test over a flat `[x0, y0, x1, y1, ...]` vertex array.
///
/// Every cell vertex must pass [`point_in_polygon`]; the first vertex outside
/// short-circuits to `false`. Cells with fewer than three vertices never match.
///
/// This is an approximation: a cell whose boundary crosses the ring while all
/// of its vertices stay inside (possible with concave rings) still matches.
pub fn cell_in_polygon(cell_vertices: &[f64], ring: &Ring) -> bool {
    if cell_vertices.len() < 6 {
        return false;
    }
    cell_vertices
        .chunks_exact(2)
        .all(|c| point_in_polygon([c[0], c[1]], ring))
}
