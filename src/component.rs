use crate::entity::Entity;
use crate::scene::Scene;

/// A type that can be attached to entities.
///
/// Any `Sized + 'static` type qualifies; the implementation only has to pick
/// a storage class:
///
/// ```
/// use pecs::{Component, Direct};
///
/// struct Position { x: f32, y: f32 }
///
/// impl Component for Position {
///     type Storage = Direct<Position>;
/// }
/// ```
///
/// Zero-sized types are tag components: with [`Direct`] storage they consume
/// no per-entity payload bytes at all, only occupancy bits. Types that need
/// their address to stay stable for as long as the component lives pick
/// [`Stable`] instead, which stores the payload behind an owning box.
pub trait Component: Sized + 'static {
    /// Storage class for the payload, [`Direct`] or [`Stable`].
    type Storage: ComponentStorage<Self>;

    /// Each container page holds `2^BUCKET_EXP_HINT` entities. The default
    /// aims for pages of roughly 64 KiB, and never goes below 64 entries.
    const BUCKET_EXP_HINT: u32 = default_bucket_exp(std::mem::size_of::<Self>());

    /// Returns a copy of the component, or `None` when the type is not
    /// copyable. [`Scene::concat`] and [`Scene::copy`] silently skip
    /// components that return `None`; everything else ignores this.
    fn duplicate(&self) -> Option<Self> {
        None
    }

    /// Called by [`Scene::attach`] before this component is inserted.
    /// Implementations can pull in required companion components with
    /// [`Scene::ensure_attached`], which default-constructs them only when
    /// absent.
    fn attach_dependencies(scene: &mut Scene, id: Entity) {
        let _ = (scene, id);
    }
}

/// Smallest exponent `b >= 6` such that `max(size, 4) << b >= 65536`.
pub const fn default_bucket_exp(size: usize) -> u32 {
    let size = if size < 4 { 4 } else { size };
    let mut exp = 6u32;
    while (size << exp) < 65536 {
        exp += 1;
    }
    exp
}

/// How a component payload lives inside a container page.
pub trait ComponentStorage<T>: Sized {
    fn store(value: T) -> Self;

    /// Pointer to the payload itself. Stays valid until the slot is dropped;
    /// for [`Stable`] it additionally survives any future page bookkeeping.
    fn get(&self) -> *mut T;
}

/// In-place storage: the payload is embedded in the page slot. This is the
/// common case, and the right choice for tag components.
pub struct Direct<T>(T);

impl<T> ComponentStorage<T> for Direct<T> {
    #[inline]
    fn store(value: T) -> Self {
        Direct(value)
    }

    #[inline]
    fn get(&self) -> *mut T {
        &self.0 as *const T as *mut T
    }
}

/// Boxed storage: the page slot holds an owning handle, the payload lives on
/// the heap and never moves until the component is erased.
pub struct Stable<T>(Box<T>);

impl<T> ComponentStorage<T> for Stable<T> {
    #[inline]
    fn store(value: T) -> Self {
        Stable(Box::new(value))
    }

    #[inline]
    fn get(&self) -> *mut T {
        &*self.0 as *const T as *mut T
    }
}
