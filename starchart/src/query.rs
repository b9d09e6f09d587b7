//! Stateless range queries over the entity store.

use crate::entity::Entity;
use crate::geometry::Rect;
use crate::store::EntityStore;

/// Entities inside `rect` (half-open on both axes), ordered by `(x, y, id)`.
///
/// Reflects the store at call time; an empty or inverted rectangle yields
/// nothing.
pub fn range_query(store: &EntityStore, rect: &Rect) -> Vec<Entity> {
    store.query_range(rect)
}
