/// The entity type, it's just an ID.
///
/// An entity alone does not take up memory in the scene; only once components
/// are attached does it use storage. Iteration order everywhere in this crate
/// is ascending id order.
pub type Entity = u32;

/// Reserved sentinel id. Never issued by [`Scene::add_entity`](crate::Scene::add_entity)
/// except to signal id-space exhaustion.
pub const INVALID_ENTITY: Entity = Entity::MAX;

/// Id 0 is reserved as well: it seeds the jump table of every component
/// container and is never handed out, so the first real entity id is 1.
pub(crate) const FIRST_ENTITY: Entity = 1;
