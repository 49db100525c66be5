use crate::component::Component;
use crate::entity::{Entity, INVALID_ENTITY};
use crate::scene::Scene;
use crate::storage::Storage;

/// One binding of a join callback.
///
/// Reference bindings (`&T`, `&mut T`) are required: entities lacking the
/// component are skipped. `Option` bindings are optional and yield `None`
/// when the component is absent.
pub trait JoinArg {
    type Component: Component;
    const REQUIRED: bool;

    /// Builds the binding from a payload pointer; null only for optional
    /// bindings of absent components.
    unsafe fn from_ptr(ptr: *mut Self::Component) -> Self;
}

impl<'a, T: Component> JoinArg for &'a T {
    type Component = T;
    const REQUIRED: bool = true;

    unsafe fn from_ptr(ptr: *mut T) -> Self {
        unsafe { &*ptr }
    }
}

impl<'a, T: Component> JoinArg for &'a mut T {
    type Component = T;
    const REQUIRED: bool = true;

    unsafe fn from_ptr(ptr: *mut T) -> Self {
        unsafe { &mut *ptr }
    }
}

impl<'a, T: Component> JoinArg for Option<&'a T> {
    type Component = T;
    const REQUIRED: bool = false;

    unsafe fn from_ptr(ptr: *mut T) -> Self {
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { &*ptr })
        }
    }
}

impl<'a, T: Component> JoinArg for Option<&'a mut T> {
    type Component = T;
    const REQUIRED: bool = false;

    unsafe fn from_ptr(ptr: *mut T) -> Self {
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { &mut *ptr })
        }
    }
}

/// A tuple of [`JoinArg`] bindings, drivable as one join.
pub trait JoinArgs: Sized {
    unsafe fn visit(scene: *mut Scene, f: &mut dyn FnMut(&mut Scene, Entity, Self));
}

/// Commits the surrounding batch even when the callback panics.
struct BatchGuard(*mut Scene);

impl BatchGuard {
    unsafe fn begin(scene: *mut Scene) -> Self {
        unsafe { (*scene).start_batch() };
        Self(scene)
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        unsafe { (*self.0).finish_batch() };
    }
}

impl JoinArgs for () {
    unsafe fn visit(_scene: *mut Scene, _f: &mut dyn FnMut(&mut Scene, Entity, Self)) {}
}

macro_rules! impl_join_args {
    ($($arg:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($arg: JoinArg),+> JoinArgs for ($($arg,)+) {
            unsafe fn visit(scene: *mut Scene, f: &mut dyn FnMut(&mut Scene, Entity, Self)) {
                let _guard = unsafe { BatchGuard::begin(scene) };
                $(
                    let storage: *mut Storage<$arg::Component> =
                        unsafe { (*scene).storage_ptr::<$arg::Component>() };
                    let mut $arg = (storage, unsafe { (*storage).first() });
                )+
                let required = 0usize $(+ ($arg::REQUIRED as usize))+;

                if required == 0 {
                    // Union walk: visit every id present in any container,
                    // advancing each cursor positioned at the visited id.
                    loop {
                        let mut current = INVALID_ENTITY;
                        $(
                            if $arg.1 < current {
                                current = $arg.1;
                            }
                        )+
                        if current == INVALID_ENTITY {
                            break;
                        }
                        let args = ($(
                            unsafe {
                                <$arg as JoinArg>::from_ptr(
                                    if (*$arg.0).contains(current) {
                                        (*$arg.0).payload_ptr(current)
                                    } else {
                                        std::ptr::null_mut()
                                    }
                                )
                            },
                        )+);
                        f(unsafe { &mut *scene }, current, args);
                        $(
                            if $arg.1 == current {
                                $arg.1 = unsafe { (*$arg.0).next_after(current) };
                            }
                        )+
                    }
                } else {
                    // Walk the smallest required container and probe the
                    // others for each of its ids.
                    let mut pivot = usize::MAX;
                    let mut pivot_size = usize::MAX;
                    {
                        let mut index = 0usize;
                        $(
                            if $arg::REQUIRED {
                                let size = unsafe { (*$arg.0).size() };
                                if size < pivot_size {
                                    pivot_size = size;
                                    pivot = index;
                                }
                            }
                            index += 1;
                        )+
                        let _ = index;
                    }
                    let mut current = {
                        let mut first = INVALID_ENTITY;
                        let mut index = 0usize;
                        $(
                            if index == pivot {
                                first = $arg.1;
                            }
                            index += 1;
                        )+
                        let _ = index;
                        first
                    };
                    while current != INVALID_ENTITY {
                        let mut all_required = true;
                        {
                            let mut index = 0usize;
                            $(
                                if $arg::REQUIRED && index != pivot {
                                    let present = unsafe { (*$arg.0).contains(current) };
                                    if !present {
                                        all_required = false;
                                    }
                                }
                                index += 1;
                            )+
                            let _ = index;
                        }
                        if all_required {
                            let args = ($(
                                unsafe {
                                    <$arg as JoinArg>::from_ptr(
                                        if $arg::REQUIRED || (*$arg.0).contains(current) {
                                            (*$arg.0).payload_ptr(current)
                                        } else {
                                            std::ptr::null_mut()
                                        }
                                    )
                                },
                            )+);
                            f(unsafe { &mut *scene }, current, args);
                        }
                        current = {
                            let mut next = INVALID_ENTITY;
                            let mut index = 0usize;
                            $(
                                if index == pivot {
                                    next = unsafe { (*$arg.0).next_after(current) };
                                }
                                index += 1;
                            )+
                            let _ = index;
                            next
                        };
                    }
                }
            }
        }
    };
}

impl_join_args!(A);
impl_join_args!(A, B);
impl_join_args!(A, B, C);
impl_join_args!(A, B, C, D);
impl_join_args!(A, B, C, D, E);
impl_join_args!(A, B, C, D, E, F);
impl_join_args!(A, B, C, D, E, F, G);
impl_join_args!(A, B, C, D, E, F, G, H);

impl Scene {
    /// Calls `f` for every suitable entity, in strictly ascending id order.
    ///
    /// The binding tuple decides how entities are selected: reference
    /// bindings are required components, `Option` bindings are optional.
    /// With at least one required binding, the walk is driven by the required
    /// container with the fewest components; with only optional bindings the
    /// union of the containers is visited.
    ///
    /// The traversal runs inside a batch, so attaching and removing entities
    /// or components from within the callback is safe: pointers already
    /// handed to the callback stay valid, erased components immediately stop
    /// showing up in `contains`/`get`, and entities added during the
    /// traversal are not visited by it.
    ///
    /// ```
    /// use pecs::{Component, Direct, Scene};
    ///
    /// struct Age(u32);
    /// struct Alive;
    /// impl Component for Age { type Storage = Direct<Age>; }
    /// impl Component for Alive { type Storage = Direct<Alive>; }
    ///
    /// let mut scene = Scene::new();
    /// let id = scene.add_entity();
    /// scene.attach(id, Age(0));
    /// scene.attach(id, Alive);
    ///
    /// scene.for_each::<(&mut Age, Option<&Alive>), _>(|_scene, _id, (age, alive)| {
    ///     if alive.is_some() {
    ///         age.0 += 1;
    ///     }
    /// });
    /// assert_eq!(scene.get::<Age>(id).unwrap().0, 1);
    /// ```
    pub fn for_each<A, F>(&mut self, mut f: F)
    where
        A: JoinArgs,
        F: FnMut(&mut Scene, Entity, A),
    {
        let scene = self as *mut Scene;
        unsafe { A::visit(scene, &mut f) };
    }
}
