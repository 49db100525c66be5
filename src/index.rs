use std::any::Any;

use crate::component::Component;
use crate::entity::Entity;
use crate::scene::Scene;

/// Observer installed on a single component container to maintain a
/// user-defined lookup structure.
///
/// The container notifies the index at the same logical moments it emits
/// [`Added`](crate::Added) and [`Removed`](crate::Removed): immediately, even
/// while a batch is in flight. A container without an index pays nothing on
/// the insert and erase paths.
///
/// The index itself decides what searching means; expose whatever `find`
/// methods fit the component and fetch the index back out with
/// [`Scene::search_index`] to call them.
pub trait SearchIndex<T: Component>: Any {
    /// A component was attached (or replaced) at `id`.
    fn add_entity(&mut self, id: Entity, data: &T) {
        let _ = (id, data);
    }

    /// The component at `id` is going away; `data` is still alive.
    fn remove_entity(&mut self, id: Entity, data: &T) {
        let _ = (id, data);
    }

    /// Full refresh. Never called automatically; the user asks for it through
    /// [`Scene::update_search_index`] or [`Scene::update_search_indices`].
    fn update(&mut self, scene: &mut Scene) {
        let _ = scene;
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
