use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::sync::{Mutex, OnceLock};

// Component and event types are mapped to dense indices on first use by a
// process-local counter. The indices key the scene's container table and the
// dispatcher's handler table, so they must be stable for the whole process,
// not per scene.

struct TypeRegistry {
    keys: FxHashMap<TypeId, usize>,
    next: usize,
}

impl TypeRegistry {
    fn key_of(&mut self, type_id: TypeId) -> usize {
        *self.keys.entry(type_id).or_insert_with(|| {
            let key = self.next;
            self.next += 1;
            key
        })
    }
}

fn component_registry() -> &'static Mutex<TypeRegistry> {
    static REGISTRY: OnceLock<Mutex<TypeRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        Mutex::new(TypeRegistry {
            keys: FxHashMap::default(),
            next: 0,
        })
    })
}

fn event_registry() -> &'static Mutex<TypeRegistry> {
    static REGISTRY: OnceLock<Mutex<TypeRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        Mutex::new(TypeRegistry {
            keys: FxHashMap::default(),
            next: 0,
        })
    })
}

pub(crate) fn component_key<T: 'static>() -> usize {
    component_registry()
        .lock()
        .expect("component registry poisoned")
        .key_of(TypeId::of::<T>())
}

pub(crate) fn event_key<T: 'static>() -> usize {
    event_registry()
        .lock()
        .expect("event registry poisoned")
        .key_of(TypeId::of::<T>())
}
