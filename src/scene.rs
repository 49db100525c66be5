use std::collections::BTreeMap;
use std::ptr::NonNull;

use log::{debug, warn};

use crate::component::Component;
use crate::entity::{Entity, FIRST_ENTITY, INVALID_ENTITY};
use crate::error::EcsError;
use crate::event::{EventDispatcher, Subscription};
use crate::index::SearchIndex;
use crate::registry::component_key;
use crate::storage::Storage;

/// Type-erased view of one component container, used by whole-entity
/// operations that have to touch every container the scene owns.
pub(crate) trait AnyStorage {
    unsafe fn erase_id(&mut self, ctx: *mut Scene, id: Entity);
    unsafe fn clear(&mut self, ctx: *mut Scene);
    fn size(&self) -> usize;
    fn start_batch(&mut self);
    fn finish_batch(&mut self);
    fn list_entities(&self, table: &mut BTreeMap<Entity, Entity>);
    unsafe fn concat_into(&self, target: *mut Scene, table: &BTreeMap<Entity, Entity>);
    unsafe fn copy_into(&self, target: *mut Scene, result_id: Entity, original_id: Entity);
    unsafe fn update_search_index(&mut self, ctx: *mut Scene);
}

impl<T: Component> AnyStorage for Storage<T> {
    unsafe fn erase_id(&mut self, ctx: *mut Scene, id: Entity) {
        unsafe { self.erase(ctx, id) };
    }

    unsafe fn clear(&mut self, ctx: *mut Scene) {
        unsafe { Storage::clear(self, ctx) };
    }

    fn size(&self) -> usize {
        Storage::size(self)
    }

    fn start_batch(&mut self) {
        Storage::start_batch(self);
    }

    fn finish_batch(&mut self) {
        Storage::finish_batch(self);
    }

    fn list_entities(&self, table: &mut BTreeMap<Entity, Entity>) {
        Storage::list_entities(self, table);
    }

    unsafe fn concat_into(&self, target: *mut Scene, table: &BTreeMap<Entity, Entity>) {
        unsafe { Storage::concat_into(self, target, table) };
    }

    unsafe fn copy_into(&self, target: *mut Scene, result_id: Entity, original_id: Entity) {
        unsafe { Storage::copy_into(self, target, result_id, original_id) };
    }

    unsafe fn update_search_index(&mut self, ctx: *mut Scene) {
        if let Some(index) = self.search_index_mut() {
            index.update(unsafe { &mut *ctx });
        }
    }
}

struct ContainerEntry {
    erased: NonNull<dyn AnyStorage>,
    typed: *mut (),
}

/// The primary object of the ECS.
///
/// Entities are created by it, components are attached through it and events
/// are routed through it. The scene is single-threaded; none of its handles
/// are `Send` or `Sync`.
pub struct Scene {
    id_counter: Entity,
    reusable_ids: Vec<Entity>,
    // Ids freed while a batch is open are parked here and only become
    // reusable when the outermost finish_batch drains them.
    post_batch_reusable_ids: Vec<Entity>,
    defer_batch: u32,
    containers: Vec<Option<ContainerEntry>>,
    events: Box<EventDispatcher>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            id_counter: FIRST_ENTITY,
            reusable_ids: Vec::new(),
            post_batch_reusable_ids: Vec::new(),
            defer_batch: 0,
            containers: Vec::new(),
            events: Box::new(EventDispatcher::new()),
        }
    }

    // --- containers --------------------------------------------------------

    pub(crate) fn storage_ptr<T: Component>(&mut self) -> *mut Storage<T> {
        let key = component_key::<T>();
        if key >= self.containers.len() {
            self.containers.resize_with(key + 1, || None);
        }
        if self.containers[key].is_none() {
            let mut storage: Box<Storage<T>> = Box::new(Storage::new());
            if self.defer_batch > 0 {
                storage.start_batch();
            }
            let typed: *mut Storage<T> = Box::into_raw(storage);
            let erased: *mut dyn AnyStorage = typed;
            self.containers[key] = Some(ContainerEntry {
                erased: NonNull::new(erased).expect("Box::into_raw should not yield null"),
                typed: typed as *mut (),
            });
        }
        match &self.containers[key] {
            Some(entry) => entry.typed as *mut Storage<T>,
            None => unreachable!(),
        }
    }

    /// Read access to the container for `T`, if one exists yet.
    pub fn storage<T: Component>(&self) -> Option<&Storage<T>> {
        let key = component_key::<T>();
        let entry = self.containers.get(key)?.as_ref()?;
        Some(unsafe { &*(entry.typed as *mut Storage<T>) })
    }

    fn storage_mut_existing<T: Component>(&mut self) -> Option<&mut Storage<T>> {
        let key = component_key::<T>();
        let entry = self.containers.get_mut(key)?.as_mut()?;
        Some(unsafe { &mut *(entry.typed as *mut Storage<T>) })
    }

    fn erased_ptr(&self, key: usize) -> Option<*mut dyn AnyStorage> {
        self.containers
            .get(key)?
            .as_ref()
            .map(|entry| entry.erased.as_ptr())
    }

    // --- entity allocation -------------------------------------------------

    /// Allocates an entity id, preferring freed ids. Returns
    /// [`INVALID_ENTITY`] when the id space is exhausted; callers must check.
    pub fn add_entity(&mut self) -> Entity {
        if let Some(id) = self.reusable_ids.pop() {
            return id;
        }
        if self.id_counter == INVALID_ENTITY {
            warn!("entity id space exhausted");
            return INVALID_ENTITY;
        }
        let id = self.id_counter;
        self.id_counter += 1;
        id
    }

    /// Checked variant of [`add_entity`](Self::add_entity).
    pub fn try_add_entity(&mut self) -> Result<Entity, EcsError> {
        match self.add_entity() {
            INVALID_ENTITY => Err(EcsError::IdSpaceExhausted),
            id => Ok(id),
        }
    }

    /// Removes all components related to the entity and releases the id for
    /// reuse. During a batch, the id stays off the free list until commit.
    pub fn remove(&mut self, id: Entity) {
        if id == INVALID_ENTITY || id == 0 {
            return;
        }
        let ctx = self as *mut Scene;
        let mut key = 0;
        while key < self.containers.len() {
            if let Some(erased) = self.erased_ptr(key) {
                unsafe { (*erased).erase_id(ctx, id) };
            }
            key += 1;
        }
        if self.defer_batch > 0 {
            self.post_batch_reusable_ids.push(id);
        } else {
            self.reusable_ids.push(id);
        }
    }

    /// Removes all components of all entities and, when not batching, resets
    /// the id counter so all previous entity ids become invalid.
    pub fn clear_entities(&mut self) {
        debug!("clearing all entities");
        let ctx = self as *mut Scene;
        let mut key = 0;
        while key < self.containers.len() {
            if let Some(erased) = self.erased_ptr(key) {
                unsafe { (*erased).clear(ctx) };
            }
            key += 1;
        }
        if self.defer_batch == 0 {
            self.id_counter = FIRST_ENTITY;
            self.reusable_ids.clear();
            self.post_batch_reusable_ids.clear();
        }
    }

    // --- components --------------------------------------------------------

    /// Attaches `value` to `id`, first pulling in the component's declared
    /// dependencies. Replacing an existing component emits `Removed` then
    /// `Added`.
    pub fn attach<T: Component>(&mut self, id: Entity, value: T) {
        T::attach_dependencies(self, id);
        let storage = self.storage_ptr::<T>();
        let ctx = self as *mut Scene;
        unsafe { (*storage).insert(ctx, id, value) };
    }

    /// Attaches `T::default()` to `id` if the component is absent.
    pub fn ensure_attached<T: Component + Default>(&mut self, id: Entity) {
        if !self.has::<T>(id) {
            self.attach(id, T::default());
        }
    }

    /// Erases the `T` component of `id`; no-op when absent.
    pub fn detach<T: Component>(&mut self, id: Entity) {
        let storage = self.storage_ptr::<T>();
        let ctx = self as *mut Scene;
        unsafe { (*storage).erase(ctx, id) };
    }

    pub fn has<T: Component>(&self, id: Entity) -> bool {
        self.storage::<T>().is_some_and(|s| s.contains(id))
    }

    pub fn get<T: Component>(&self, id: Entity) -> Option<&T> {
        self.storage::<T>()?.get(id)
    }

    pub fn get_mut<T: Component>(&mut self, id: Entity) -> Option<&mut T> {
        self.storage_mut_existing::<T>()?.get_mut(id)
    }

    /// Number of entities holding a `T` component.
    pub fn count<T: Component>(&self) -> usize {
        self.storage::<T>().map_or(0, Storage::size)
    }

    // --- batching ----------------------------------------------------------

    /// Enters deferred-mutation mode (reentrant; a shared depth counter).
    /// Iteration via [`for_each`](Self::for_each) batches automatically.
    pub fn start_batch(&mut self) {
        self.defer_batch += 1;
        if self.defer_batch == 1 {
            let mut key = 0;
            while key < self.containers.len() {
                if let Some(erased) = self.erased_ptr(key) {
                    unsafe { (*erased).start_batch() };
                }
                key += 1;
            }
        }
    }

    /// Leaves deferred-mutation mode; the outermost call commits all pending
    /// changes and releases ids freed during the batch.
    pub fn finish_batch(&mut self) {
        if self.defer_batch == 0 {
            return;
        }
        self.defer_batch -= 1;
        if self.defer_batch == 0 {
            let mut key = 0;
            while key < self.containers.len() {
                if let Some(erased) = self.erased_ptr(key) {
                    unsafe { (*erased).finish_batch() };
                }
                key += 1;
            }
            self.reusable_ids.append(&mut self.post_batch_reusable_ids);
        }
    }

    // --- scene-to-scene ----------------------------------------------------

    /// Copies all entities and their duplicable components from `other` into
    /// this scene under fresh ids. Components whose
    /// [`duplicate`](Component::duplicate) returns `None` are skipped
    /// silently; that is deliberate, not an error. When `translation_table`
    /// is given it receives the old-id to new-id mapping.
    ///
    /// Finish any open batch on `other` first; pending mutations over there
    /// are not visible to this walk.
    pub fn concat(
        &mut self,
        other: &Scene,
        translation_table: Option<&mut BTreeMap<Entity, Entity>>,
    ) {
        let mut table = BTreeMap::new();
        for entry in other.containers.iter().flatten() {
            unsafe { entry.erased.as_ref().list_entities(&mut table) };
        }
        debug!("concatenating {} entities", table.len());
        self.start_batch();
        for new_id in table.values_mut() {
            *new_id = self.add_entity();
        }
        let target = self as *mut Scene;
        for entry in other.containers.iter().flatten() {
            unsafe { entry.erased.as_ref().concat_into(target, &table) };
        }
        self.finish_batch();
        if let Some(out) = translation_table {
            *out = table;
        }
    }

    /// Copies one entity's duplicable components from `other` into this scene
    /// under a fresh id, which is returned.
    pub fn copy(&mut self, other: &Scene, other_id: Entity) -> Entity {
        let id = self.add_entity();
        let target = self as *mut Scene;
        for entry in other.containers.iter().flatten() {
            unsafe { entry.erased.as_ref().copy_into(target, id, other_id) };
        }
        id
    }

    // --- events ------------------------------------------------------------

    /// Synchronously invokes every handler subscribed to `E`, in registration
    /// order. Handlers may mutate the scene and emit further events.
    pub fn emit<E: 'static>(&mut self, event: E) {
        let ctx = self as *mut Scene;
        let dispatcher = &mut *self.events as *mut EventDispatcher;
        unsafe { (*dispatcher).emit(ctx, &event) };
    }

    /// Registers a handler and returns its numeric subscription id.
    pub fn add_handler<E, F>(&mut self, callback: F) -> usize
    where
        E: 'static,
        F: FnMut(&mut Scene, &E) + 'static,
    {
        self.events.add_handler(callback)
    }

    /// Unregisters every handler registered under `subscription_id`.
    pub fn remove_handler(&mut self, subscription_id: usize) {
        self.events.remove_handler(subscription_id);
    }

    /// Registers a handler whose lifetime is tied to the returned
    /// [`Subscription`]; dropping the handle unregisters it. The handle must
    /// not outlive this scene.
    pub fn subscribe<E, F>(&mut self, callback: F) -> Subscription
    where
        E: 'static,
        F: FnMut(&mut Scene, &E) + 'static,
    {
        let id = self.events.add_handler(callback);
        Subscription::new(&mut *self.events as *mut EventDispatcher, id)
    }

    /// Exact number of handlers currently registered for `E`.
    pub fn handler_count<E: 'static>(&self) -> usize {
        self.events.handler_count::<E>()
    }

    // --- search indices ----------------------------------------------------

    /// Installs a search index on the container for `T`. The index only sees
    /// mutations from this point on; call
    /// [`update_search_index`](Self::update_search_index) to backfill.
    pub fn set_search_index<T, I>(&mut self, index: I)
    where
        T: Component,
        I: SearchIndex<T>,
    {
        let storage = self.storage_ptr::<T>();
        unsafe { (*storage).set_search_index(Box::new(index)) };
    }

    /// Fetches the installed index back out, downcast to its concrete type.
    pub fn search_index<T, I>(&self) -> Option<&I>
    where
        T: Component,
        I: SearchIndex<T>,
    {
        self.storage::<T>()?
            .search_index()?
            .as_any()
            .downcast_ref::<I>()
    }

    /// Runs the full refresh of the index installed for `T`, if any.
    pub fn update_search_index<T: Component>(&mut self) {
        let storage = self.storage_ptr::<T>();
        let ctx = self as *mut Scene;
        unsafe { (*storage).update_search_index(ctx) };
    }

    /// Runs the full refresh of every installed index.
    pub fn update_search_indices(&mut self) {
        let ctx = self as *mut Scene;
        let mut key = 0;
        while key < self.containers.len() {
            if let Some(erased) = self.erased_ptr(key) {
                unsafe { (*erased).update_search_index(ctx) };
            }
            key += 1;
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        // Clear through the normal path first so a Removed event fires for
        // every component still present, while handlers are still alive.
        self.clear_entities();
        for entry in self.containers.iter().flatten() {
            unsafe { drop(Box::from_raw(entry.erased.as_ptr())) };
        }
    }
}
