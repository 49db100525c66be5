//! A paged sparse-set entity component system.
//!
//! Entities are bare 32-bit ids; each component type lives in its own sparse
//! container of fixed-size pages with an occupancy bitmask and a jump table,
//! so multi-component iteration advances past gaps in O(1). Mutating while
//! iterating is supported through deferred batches: adds and removes take
//! logical effect immediately but their structural work is committed when the
//! outermost batch finishes, which keeps component pointers handed out during
//! a traversal valid.
//!
//! ```
//! use pecs::{Component, Direct, Scene};
//!
//! struct Position { x: i32, y: i32 }
//! struct Marked;
//!
//! impl Component for Position { type Storage = Direct<Position>; }
//! impl Component for Marked { type Storage = Direct<Marked>; }
//!
//! let mut scene = Scene::new();
//! let id = scene.add_entity();
//! scene.attach(id, Position { x: 1, y: 2 });
//! scene.attach(id, Marked);
//!
//! let mut visited = 0;
//! scene.for_each::<(&Position, &Marked), _>(|_scene, _id, (position, _)| {
//!     assert_eq!(position.x, 1);
//!     visited += 1;
//! });
//! assert_eq!(visited, 1);
//! ```

pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod index;
pub mod query;
mod registry;
pub mod scene;
pub mod storage;

pub use component::{default_bucket_exp, Component, ComponentStorage, Direct, Stable};
pub use entity::{Entity, INVALID_ENTITY};
pub use error::EcsError;
pub use event::{Added, EventDispatcher, Removed, Subscription};
pub use index::SearchIndex;
pub use query::{JoinArg, JoinArgs};
pub use scene::Scene;
pub use storage::Storage;
