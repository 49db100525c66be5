use std::collections::BTreeMap;
use std::mem::MaybeUninit;

use crate::component::{Component, ComponentStorage};
use crate::entity::{Entity, INVALID_ENTITY};
use crate::event::{Added, Removed};
use crate::index::SearchIndex;
use crate::scene::Scene;

/// Per-component-type sparse container.
///
/// Entities map to pages ("buckets") of `2^B` ids where `B` is the component
/// type's [`BUCKET_EXP_HINT`](Component::BUCKET_EXP_HINT). Every bucket holds
/// up to three lazily allocated parallel arrays:
///
/// - an occupancy bitmask (one bit per id, packed into `u64` words),
/// - a jump table (one entity entry per id),
/// - the payload slots (zero bytes total for tag components).
///
/// A top-level bitmask mirrors which buckets have any occupancy bit set.
///
/// # Jump table
///
/// For every occupied id `i`, `jump[i]` holds the next occupied id above `i`
/// (or [`INVALID_ENTITY`]), and `jump[0]` holds the smallest occupied id.
/// Id 0 is never occupied; it acts as a permanent virtual head, which is why
/// bucket 0's jump table always exists. Entries at unoccupied positions are
/// stale and never read. Repair on insert and erase touches exactly two
/// entries after a previous-occupied-id search that runs on the bitmasks.
///
/// # Batching
///
/// While a batch is active, adds and erases keep their logical effect
/// (`contains`, `get`, `size`, events) immediate but defer the structural
/// work. A per-bucket overlay bitmask marks ids whose occupancy will toggle
/// at commit, and a checklist records them in mutation order. Payloads are
/// written eagerly on insert so pointers can be handed out right away;
/// payloads of erased components stay alive until the commit so pointers
/// handed out earlier keep working.
pub struct Storage<T: Component> {
    entity_count: u32,
    bucket_bitmask: Vec<Option<Box<[u64]>>>,
    bucket_jump: Vec<Option<Box<[Entity]>>>,
    bucket_slots: Vec<Option<Box<[MaybeUninit<T::Storage>]>>>,
    bucket_batch: Vec<Option<Box<[u64]>>>,
    top_bitmask: Vec<u64>,
    batching: bool,
    batch_checklist: Vec<Entity>,
    search: Option<Box<dyn SearchIndex<T>>>,
}

impl<T: Component> Storage<T> {
    pub(crate) const BUCKET_EXP: u32 = T::BUCKET_EXP_HINT;
    pub(crate) const BUCKET_SIZE: u32 = 1 << Self::BUCKET_EXP;
    const BUCKET_MASK: u32 = Self::BUCKET_SIZE - 1;
    const BITMASK_WORDS: usize = if Self::BUCKET_SIZE >= 64 {
        (Self::BUCKET_SIZE >> 6) as usize
    } else {
        1
    };

    pub(crate) fn new() -> Self {
        // Bucket 0 always exists so that jump[0] can seed iteration.
        let mut jump = Vec::with_capacity(1);
        jump.push(Some(Self::new_jump_page()));
        Self {
            entity_count: 0,
            bucket_bitmask: vec![None],
            bucket_jump: jump,
            bucket_slots: vec![None],
            bucket_batch: vec![None],
            top_bitmask: vec![0],
            batching: false,
            batch_checklist: Vec::new(),
            search: None,
        }
    }

    #[inline]
    fn bucket_index(id: Entity) -> usize {
        (id >> Self::BUCKET_EXP) as usize
    }

    #[inline]
    fn bucket_offset(id: Entity) -> u32 {
        id & Self::BUCKET_MASK
    }

    fn new_bitmask_page() -> Box<[u64]> {
        vec![0u64; Self::BITMASK_WORDS].into_boxed_slice()
    }

    fn new_jump_page() -> Box<[Entity]> {
        vec![INVALID_ENTITY; Self::BUCKET_SIZE as usize].into_boxed_slice()
    }

    fn new_slot_page() -> Box<[MaybeUninit<T::Storage>]> {
        (0..Self::BUCKET_SIZE as usize)
            .map(|_| MaybeUninit::uninit())
            .collect()
    }

    fn ensure_bucket(&mut self, bucket: usize) {
        if bucket >= self.bucket_bitmask.len() {
            let count = bucket + 1;
            self.bucket_bitmask.resize_with(count, || None);
            self.bucket_jump.resize_with(count, || None);
            self.bucket_slots.resize_with(count, || None);
            self.bucket_batch.resize_with(count, || None);
            self.top_bitmask.resize((count + 63) >> 6, 0);
        }
    }

    fn ensure_bitmask(&mut self, bucket: usize) {
        if self.bucket_bitmask[bucket].is_none() {
            self.bucket_bitmask[bucket] = Some(Self::new_bitmask_page());
        }
    }

    fn ensure_jump(&mut self, bucket: usize) {
        if self.bucket_jump[bucket].is_none() {
            self.bucket_jump[bucket] = Some(Self::new_jump_page());
        }
    }

    fn ensure_slots(&mut self, bucket: usize) {
        if self.bucket_slots[bucket].is_none() {
            self.bucket_slots[bucket] = Some(Self::new_slot_page());
        }
    }

    fn ensure_batch(&mut self, bucket: usize) {
        if self.bucket_batch[bucket].is_none() {
            self.bucket_batch[bucket] = Some(Self::new_bitmask_page());
        }
    }

    /// Frees the pages of an emptied bucket. Bucket 0 keeps its jump table,
    /// it carries the iteration seed entry.
    fn release_bucket(&mut self, bucket: usize) {
        self.bucket_bitmask[bucket] = None;
        self.bucket_slots[bucket] = None;
        self.bucket_batch[bucket] = None;
        if bucket != 0 {
            self.bucket_jump[bucket] = None;
        }
    }

    // --- occupancy bitmask -------------------------------------------------

    fn occupancy_bit(&self, id: Entity) -> bool {
        let bucket = Self::bucket_index(id);
        if bucket >= self.bucket_bitmask.len() {
            return false;
        }
        match self.bucket_bitmask[bucket].as_deref() {
            Some(mask) => {
                let offset = Self::bucket_offset(id);
                (mask[(offset >> 6) as usize] >> (offset & 63)) & 1 != 0
            }
            None => false,
        }
    }

    fn bitmask_insert(&mut self, id: Entity) {
        let bucket = Self::bucket_index(id);
        self.ensure_bitmask(bucket);
        let offset = Self::bucket_offset(id);
        let mask = self.bucket_bitmask[bucket]
            .as_deref_mut()
            .expect("occupancy page missing");
        mask[(offset >> 6) as usize] |= 1u64 << (offset & 63);
        self.top_bitmask[bucket >> 6] |= 1u64 << (bucket & 63);
    }

    /// Clears the bit and reports whether the whole page is now empty,
    /// updating the top bitmask accordingly.
    fn bitmask_erase(&mut self, id: Entity) -> bool {
        let bucket = Self::bucket_index(id);
        let offset = Self::bucket_offset(id);
        let mask = self.bucket_bitmask[bucket]
            .as_deref_mut()
            .expect("occupancy page missing");
        mask[(offset >> 6) as usize] &= !(1u64 << (offset & 63));
        let empty = mask.iter().all(|word| *word == 0);
        if empty {
            self.top_bitmask[bucket >> 6] &= !(1u64 << (bucket & 63));
        }
        empty
    }

    // --- batch overlay -----------------------------------------------------

    fn overlay_bit(&self, id: Entity) -> bool {
        let bucket = Self::bucket_index(id);
        if bucket >= self.bucket_batch.len() {
            return false;
        }
        match self.bucket_batch[bucket].as_deref() {
            Some(mask) => {
                let offset = Self::bucket_offset(id);
                (mask[(offset >> 6) as usize] >> (offset & 63)) & 1 != 0
            }
            None => false,
        }
    }

    /// Toggles the overlay bit and returns its new value.
    fn overlay_toggle(&mut self, id: Entity) -> bool {
        let bucket = Self::bucket_index(id);
        self.ensure_batch(bucket);
        let offset = Self::bucket_offset(id);
        let mask = self.bucket_batch[bucket]
            .as_deref_mut()
            .expect("overlay page missing");
        let word = &mut mask[(offset >> 6) as usize];
        let bit = 1u64 << (offset & 63);
        *word ^= bit;
        *word & bit != 0
    }

    fn overlay_clear(&mut self, id: Entity) {
        let bucket = Self::bucket_index(id);
        if let Some(mask) = self.bucket_batch[bucket].as_deref_mut() {
            let offset = Self::bucket_offset(id);
            mask[(offset >> 6) as usize] &= !(1u64 << (offset & 63));
        }
    }

    // --- jump table --------------------------------------------------------

    fn jump_get(&self, id: Entity) -> Entity {
        let bucket = Self::bucket_index(id);
        if bucket >= self.bucket_jump.len() {
            return INVALID_ENTITY;
        }
        match self.bucket_jump[bucket].as_deref() {
            Some(jump) => jump[Self::bucket_offset(id) as usize],
            None => INVALID_ENTITY,
        }
    }

    fn jump_set(&mut self, id: Entity, value: Entity) {
        let bucket = Self::bucket_index(id);
        let jump = self.bucket_jump[bucket]
            .as_deref_mut()
            .expect("jump table page missing");
        jump[Self::bucket_offset(id) as usize] = value;
    }

    fn jump_table_insert(&mut self, id: Entity) {
        self.ensure_jump(Self::bucket_index(id));
        let prev = self.find_previous_entity(id);
        let next = self.jump_get(prev);
        self.jump_set(id, next);
        self.jump_set(prev, id);
    }

    fn jump_table_erase(&mut self, id: Entity) {
        let prev = self.find_previous_entity(id);
        let next = self.jump_get(id);
        self.jump_set(prev, next);
    }

    /// Largest occupied id below `id`, or 0 (the virtual head) if none.
    ///
    /// Searches the id's own page first, then walks the top bitmask to the
    /// closest preceding non-empty page and takes its highest set bit.
    fn find_previous_entity(&self, id: Entity) -> Entity {
        let bucket = Self::bucket_index(id);
        let bucket_count = self.bucket_bitmask.len();
        if bucket < bucket_count {
            if let Some(mask) = self.bucket_bitmask[bucket].as_deref() {
                if let Some(prev) = prev_set_bit(mask, Self::bucket_offset(id)) {
                    return ((bucket as u32) << Self::BUCKET_EXP) | prev;
                }
            }
        }
        let below = bucket.min(bucket_count) as u32;
        if let Some(prev_bucket) = prev_set_bit(&self.top_bitmask, below) {
            let mask = self.bucket_bitmask[prev_bucket as usize]
                .as_deref()
                .expect("top bit set for missing occupancy page");
            if let Some(last) = last_set_bit(mask) {
                return (prev_bucket << Self::BUCKET_EXP) | last;
            }
        }
        0
    }

    // --- payload slots -----------------------------------------------------

    pub(crate) fn payload_ptr(&self, id: Entity) -> *mut T {
        let bucket = Self::bucket_index(id);
        let slots = self.bucket_slots[bucket]
            .as_deref()
            .expect("component page missing");
        unsafe { (*slots[Self::bucket_offset(id) as usize].as_ptr()).get() }
    }

    unsafe fn slot_write(&mut self, id: Entity, value: T) {
        let bucket = Self::bucket_index(id);
        self.ensure_slots(bucket);
        let slots = self.bucket_slots[bucket]
            .as_deref_mut()
            .expect("component page missing");
        slots[Self::bucket_offset(id) as usize]
            .write(<T::Storage as ComponentStorage<T>>::store(value));
    }

    unsafe fn slot_drop(&mut self, id: Entity) {
        let bucket = Self::bucket_index(id);
        let slots = self.bucket_slots[bucket]
            .as_deref_mut()
            .expect("component page missing");
        unsafe { slots[Self::bucket_offset(id) as usize].assume_init_drop() };
    }

    // --- events / search ---------------------------------------------------

    unsafe fn signal_add(&mut self, ctx: *mut Scene, id: Entity, data: *mut T) {
        if let Some(index) = self.search.as_deref_mut() {
            index.add_entity(id, unsafe { &*data });
        }
        unsafe { (*ctx).emit(Added { id, data }) };
    }

    unsafe fn signal_remove(&mut self, ctx: *mut Scene, id: Entity, data: *mut T) {
        if let Some(index) = self.search.as_deref_mut() {
            index.remove_entity(id, unsafe { &*data });
        }
        unsafe { (*ctx).emit(Removed { id, data }) };
    }

    pub(crate) fn set_search_index(&mut self, index: Box<dyn SearchIndex<T>>) {
        self.search = Some(index);
    }

    pub(crate) fn search_index(&self) -> Option<&dyn SearchIndex<T>> {
        self.search.as_deref()
    }

    pub(crate) fn search_index_mut(&mut self) -> Option<&mut dyn SearchIndex<T>> {
        self.search.as_deref_mut()
    }

    // --- public view -------------------------------------------------------

    /// Whether `id` currently has this component. During a batch this is the
    /// post-commit view: occupancy XOR the pending-toggle overlay.
    pub fn contains(&self, id: Entity) -> bool {
        if id == INVALID_ENTITY {
            return false;
        }
        let occupied = self.occupancy_bit(id);
        if self.batching {
            occupied ^ self.overlay_bit(id)
        } else {
            occupied
        }
    }

    /// Number of live components, maintained eagerly even mid-batch.
    pub fn size(&self) -> usize {
        self.entity_count as usize
    }

    pub fn get(&self, id: Entity) -> Option<&T> {
        if !self.contains(id) {
            return None;
        }
        Some(unsafe { &*self.payload_ptr(id) })
    }

    pub fn get_mut(&mut self, id: Entity) -> Option<&mut T> {
        if !self.contains(id) {
            return None;
        }
        Some(unsafe { &mut *self.payload_ptr(id) })
    }

    /// Smallest committed occupied id, or [`INVALID_ENTITY`] when empty.
    /// Components pending in an open batch are not part of this walk.
    pub fn first(&self) -> Entity {
        self.jump_get(0)
    }

    /// Next committed occupied id above `id`, which must be occupied or 0.
    pub fn next_after(&self, id: Entity) -> Entity {
        self.jump_get(id)
    }

    // --- mutation ----------------------------------------------------------

    /// Inserts `value` at `id`, replacing any existing component there
    /// (`Removed` then `Added` fire on replacement). Inserting at
    /// [`INVALID_ENTITY`] or at the reserved id 0 is silently ignored.
    pub(crate) unsafe fn insert(&mut self, ctx: *mut Scene, id: Entity, value: T) {
        if id == INVALID_ENTITY || id == 0 {
            return;
        }
        if self.contains(id) {
            let old = self.payload_ptr(id);
            unsafe { self.signal_remove(ctx, id, old) };
            unsafe { self.slot_drop(id) };
            unsafe { self.slot_write(id, value) };
            let new = self.payload_ptr(id);
            unsafe { self.signal_add(ctx, id, new) };
            return;
        }
        self.entity_count += 1;
        let bucket = Self::bucket_index(id);
        self.ensure_bucket(bucket);
        if self.batching {
            let pending_erase = self.occupancy_bit(id);
            if self.overlay_toggle(id) {
                self.batch_checklist.push(id);
            }
            if pending_erase {
                // Reinsert over a pending erase: the committed payload is
                // still in the slot, replace it in place.
                unsafe { self.slot_drop(id) };
            }
            unsafe { self.slot_write(id, value) };
            let data = self.payload_ptr(id);
            unsafe { self.signal_add(ctx, id, data) };
        } else {
            self.bitmask_insert(id);
            self.jump_table_insert(id);
            unsafe { self.slot_write(id, value) };
            let data = self.payload_ptr(id);
            unsafe { self.signal_add(ctx, id, data) };
        }
    }

    /// Erases the component at `id`; no-op when absent.
    pub(crate) unsafe fn erase(&mut self, ctx: *mut Scene, id: Entity) {
        if !self.contains(id) {
            return;
        }
        self.entity_count -= 1;
        let data = self.payload_ptr(id);
        if self.batching {
            // Toggle before emitting so observers already see the erase.
            let deferred = self.overlay_toggle(id);
            if deferred {
                self.batch_checklist.push(id);
            }
            unsafe { self.signal_remove(ctx, id, data) };
            if !deferred {
                // Cancelled a pending add; nothing will commit, so the
                // payload dies now.
                unsafe { self.slot_drop(id) };
            }
        } else {
            unsafe { self.signal_remove(ctx, id, data) };
            unsafe { self.slot_drop(id) };
            self.jump_table_erase(id);
            if self.bitmask_erase(id) {
                self.release_bucket(Self::bucket_index(id));
            }
        }
    }

    /// Erases every component, emitting `Removed` for each. Under batching
    /// this degenerates to one scheduled erase per present id.
    pub(crate) unsafe fn clear(&mut self, ctx: *mut Scene) {
        if self.batching {
            let mut ids: Vec<Entity> = Vec::with_capacity(self.entity_count as usize);
            let mut id = self.first();
            while id != INVALID_ENTITY {
                ids.push(id);
                id = self.next_after(id);
            }
            for &pending in &self.batch_checklist {
                if self.overlay_bit(pending) && !self.occupancy_bit(pending) {
                    ids.push(pending);
                }
            }
            for id in ids {
                unsafe { self.erase(ctx, id) };
            }
        } else {
            let mut id = self.first();
            while id != INVALID_ENTITY {
                let next = self.next_after(id);
                unsafe { self.erase(ctx, id) };
                id = next;
            }
        }
    }

    // --- batching ----------------------------------------------------------

    pub(crate) fn start_batch(&mut self) {
        self.batching = true;
    }

    /// Commits the deferred mutations: walks the checklist in mutation order,
    /// skipping ids whose pending toggle was cancelled, then gives emptied
    /// buckets back.
    pub(crate) fn finish_batch(&mut self) {
        self.batching = false;
        let checklist = std::mem::take(&mut self.batch_checklist);
        for &id in &checklist {
            if !self.overlay_bit(id) {
                continue;
            }
            self.overlay_clear(id);
            if self.occupancy_bit(id) {
                unsafe { self.slot_drop(id) };
                self.jump_table_erase(id);
                self.bitmask_erase(id);
            } else {
                self.bitmask_insert(id);
                self.jump_table_insert(id);
            }
        }
        let mut checklist = checklist;
        checklist.clear();
        self.batch_checklist = checklist;
        for bucket in 0..self.bucket_bitmask.len() {
            let empty = match self.bucket_bitmask[bucket].as_deref() {
                Some(mask) => mask.iter().all(|word| *word == 0),
                None => false,
            };
            if empty {
                self.release_bucket(bucket);
            }
        }
    }

    // --- whole-container operations (scene plumbing) -----------------------

    pub(crate) fn list_entities(&self, table: &mut BTreeMap<Entity, Entity>) {
        let mut id = self.first();
        while id != INVALID_ENTITY {
            table.insert(id, INVALID_ENTITY);
            id = self.next_after(id);
        }
    }

    pub(crate) unsafe fn concat_into(
        &self,
        target: *mut Scene,
        table: &BTreeMap<Entity, Entity>,
    ) {
        let mut id = self.first();
        while id != INVALID_ENTITY {
            let value = unsafe { &*self.payload_ptr(id) };
            if let Some(copy) = value.duplicate() {
                if let Some(&new_id) = table.get(&id) {
                    unsafe { (*target).attach(new_id, copy) };
                }
            }
            id = self.next_after(id);
        }
    }

    pub(crate) unsafe fn copy_into(
        &self,
        target: *mut Scene,
        result_id: Entity,
        original_id: Entity,
    ) {
        if let Some(value) = self.get(original_id) {
            if let Some(copy) = value.duplicate() {
                unsafe { (*target).attach(result_id, copy) };
            }
        }
    }
}

impl<T: Component> Drop for Storage<T> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T::Storage>() {
            return;
        }
        // Initialized slots are the committed occupancy plus pending adds;
        // a pending erase keeps its payload until commit, so occupancy still
        // covers it.
        for bucket in 0..self.bucket_slots.len() {
            for word in 0..Self::BITMASK_WORDS {
                let occupied = self.bucket_bitmask[bucket]
                    .as_deref()
                    .map_or(0, |mask| mask[word]);
                let overlay = self.bucket_batch[bucket]
                    .as_deref()
                    .map_or(0, |mask| mask[word]);
                let mut live = occupied | overlay;
                while live != 0 {
                    let bit = live.trailing_zeros();
                    let offset = ((word as u32) << 6) + bit;
                    if let Some(slots) = self.bucket_slots[bucket].as_deref_mut() {
                        unsafe { slots[offset as usize].assume_init_drop() };
                    }
                    live &= live - 1;
                }
            }
        }
    }
}

/// Highest set bit strictly below `below`, as a bit index into `mask`.
fn prev_set_bit(mask: &[u64], below: u32) -> Option<u32> {
    let mut word = (below >> 6) as usize;
    let bit = below & 63;
    if word < mask.len() && bit != 0 {
        let partial = mask[word] & ((1u64 << bit) - 1);
        if partial != 0 {
            return Some(((word as u32) << 6) + 63 - partial.leading_zeros());
        }
    }
    if word > mask.len() {
        word = mask.len();
    }
    while word > 0 {
        word -= 1;
        if mask[word] != 0 {
            return Some(((word as u32) << 6) + 63 - mask[word].leading_zeros());
        }
    }
    None
}

/// Highest set bit in `mask`.
fn last_set_bit(mask: &[u64]) -> Option<u32> {
    let mut word = mask.len();
    while word > 0 {
        word -= 1;
        if mask[word] != 0 {
            return Some(((word as u32) << 6) + 63 - mask[word].leading_zeros());
        }
    }
    None
}
