//! Edits coming from the drawing layer.

use foundation::{RoiId, VERTEX_DIFF_TOLERANCE, approx_eq_point};
use geometry::Ring;
use tracing::warn;

use crate::roi::RoiStore;

#[derive(Debug, Clone, PartialEq)]
pub enum EditEvent {
    /// A polygon finished drawing or was pasted.
    Added { ring: Ring },
    GeometryChanged { id: RoiId, ring: Ring },
    Removed { id: RoiId },
    Cleared,
}

impl EditEvent {
    pub fn target(&self) -> Option<RoiId> {
        match self {
            EditEvent::GeometryChanged { id, .. } | EditEvent::Removed { id } => Some(*id),
            EditEvent::Added { .. } | EditEvent::Cleared => None,
        }
    }
}

fn same_ring(a: &Ring, b: &Ring) -> bool {
    a.len() == b.len()
        && a
            .vertices()
            .iter()
            .zip(b.vertices())
            .all(|(p, q)| approx_eq_point(*p, *q, VERTEX_DIFF_TOLERANCE))
}

/// Index of the polygon that changed between two snapshots of the same
/// list: the first whose vertices differ beyond tolerance. When nothing
/// differs the last polygon is assumed, with a warning.
pub fn find_edited_polygon(previous: &[Ring], updated: &[Ring]) -> Option<usize> {
    let changed = updated
        .iter()
        .enumerate()
        .find(|(i, ring)| previous.get(*i).is_none_or(|prev| !same_ring(prev, ring)))
        .map(|(i, _)| i);
    if changed.is_some() {
        return changed;
    }
    let last = updated.len().checked_sub(1)?;
    warn!(index = last, "no polygon differs from the previous snapshot; assuming the last one");
    Some(last)
}

/// Turns a full snapshot from a drawing layer that does not report ids into
/// an [`EditEvent`] against `store`. `None` when the snapshot carries no
/// change that can be attributed.
pub fn infer_edit(store: &RoiStore, updated: &[Ring]) -> Option<EditEvent> {
    let previous: Vec<(RoiId, Ring)> = store
        .iter()
        .map(|f| (f.polygon_id, f.ring.clone()))
        .collect();

    if updated.is_empty() {
        return (!previous.is_empty()).then_some(EditEvent::Cleared);
    }
    if updated.len() > previous.len() {
        let ring = updated.last()?.clone();
        return Some(EditEvent::Added { ring });
    }

    let prev_rings: Vec<Ring> = previous.iter().map(|(_, r)| r.clone()).collect();
    if updated.len() < previous.len() {
        // The first slot that no longer matches is the removed one.
        let idx = prev_rings
            .iter()
            .enumerate()
            .find(|(i, ring)| updated.get(*i).is_none_or(|u| !same_ring(ring, u)))
            .map_or(previous.len() - 1, |(i, _)| i);
        return Some(EditEvent::Removed { id: previous[idx].0 });
    }

    let idx = find_edited_polygon(&prev_rings, updated)?;
    Some(EditEvent::GeometryChanged {
        id: previous[idx].0,
        ring: updated[idx].clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn square(lo: f64, hi: f64) -> Ring {
        Ring::new(vec![[lo, lo], [hi, lo], [hi, hi], [lo, hi]])
    }

    #[test]
    fn finds_first_changed_polygon() {
        let before = vec![square(0.0, 1.0), square(2.0, 3.0), square(4.0, 5.0)];
        let mut after = before.clone();
        after[1] = square(2.0, 3.5);
        assert_eq!(find_edited_polygon(&before, &after), Some(1));
    }

    #[test]
    fn sub_tolerance_moves_are_not_edits() {
        let before = vec![square(0.0, 1.0), square(2.0, 3.0)];
        let after = vec![square(0.0, 1.0 + 1e-12), square(2.0, 3.0)];
        // Falls back to the last polygon.
        assert_eq!(find_edited_polygon(&before, &after), Some(1));
        assert_eq!(find_edited_polygon(&[], &[]), None);
    }

    #[test]
    fn infers_events_from_snapshots() {
        let mut store = RoiStore::new();
        let a = store.add(square(0.0, 1.0));
        let b = store.add(square(2.0, 3.0));

        let moved = vec![square(0.0, 1.0), square(2.0, 4.0)];
        assert_eq!(
            infer_edit(&store, &moved),
            Some(EditEvent::GeometryChanged {
                id: b,
                ring: square(2.0, 4.0)
            })
        );

        let dropped_first = vec![square(2.0, 3.0)];
        assert_eq!(infer_edit(&store, &dropped_first), Some(EditEvent::Removed { id: a }));

        let grown = vec![square(0.0, 1.0), square(2.0, 3.0), square(6.0, 7.0)];
        assert_eq!(
            infer_edit(&store, &grown),
            Some(EditEvent::Added {
                ring: square(6.0, 7.0)
            })
        );

        assert_eq!(infer_edit(&store, &[]), Some(EditEvent::Cleared));
    }
}
