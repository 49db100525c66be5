use crate::entity::Entity;
use crate::registry::event_key;
use crate::scene::Scene;

/// Built-in event emitted when a component is attached to an entity.
///
/// `data` points at the freshly written payload. It is valid for at least the
/// duration of the handler call; holding on to it afterwards is only sound
/// for [`Stable`](crate::Stable) components.
pub struct Added<T> {
    /// The entity that got the component.
    pub id: Entity,
    /// The component payload.
    pub data: *mut T,
}

/// Built-in event emitted when a component is erased from an entity.
///
/// Emitted at the logical moment of the erase, so during a batch the payload
/// behind `data` is still alive even though `contains` already reports the
/// component gone. The scene emits one `Removed` per still-present component
/// when it is dropped, before any handlers are torn down.
pub struct Removed<T> {
    /// The entity that lost the component.
    pub id: Entity,
    /// The component payload (not destroyed quite yet).
    pub data: *mut T,
}

struct EventHandler {
    subscription_id: usize,
    callback: Box<dyn FnMut(*mut Scene, *const ())>,
}

/// Type-keyed synchronous event fan-out.
///
/// One ordered handler list per event type; emission invokes handlers in
/// registration order on the calling thread. Handlers receive the scene and
/// may attach, erase and emit recursively. A handler subscribed to the event
/// type currently being emitted joins the list but is not invoked by the
/// in-flight emission.
pub struct EventDispatcher {
    handlers: Vec<Vec<EventHandler>>,
    subscription_counter: usize,
}

impl EventDispatcher {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Vec::new(),
            subscription_counter: 0,
        }
    }

    pub(crate) unsafe fn emit<E: 'static>(&mut self, ctx: *mut Scene, event: &E) {
        let key = event_key::<E>();
        if key >= self.handlers.len() {
            return;
        }
        let initial = self.handlers[key].len();
        let mut i = 0;
        loop {
            // Re-read the list every step: a handler may subscribe or
            // unsubscribe for this very event type. Handlers added during
            // the emission land beyond `initial` and are skipped this pass.
            let list = &mut self.handlers[key];
            let limit = initial.min(list.len());
            if i >= limit {
                break;
            }
            let callback: *mut dyn FnMut(*mut Scene, *const ()) = &mut *list[i].callback;
            unsafe { (*callback)(ctx, event as *const E as *const ()) };
            i += 1;
        }
    }

    pub(crate) fn handler_count<E: 'static>(&self) -> usize {
        let key = event_key::<E>();
        self.handlers.get(key).map_or(0, Vec::len)
    }

    pub(crate) fn add_handler<E, F>(&mut self, callback: F) -> usize
    where
        E: 'static,
        F: FnMut(&mut Scene, &E) + 'static,
    {
        let id = self.subscription_counter;
        self.subscription_counter += 1;
        self.push_handler(id, callback);
        id
    }

    pub(crate) fn push_handler<E, F>(&mut self, subscription_id: usize, mut callback: F)
    where
        E: 'static,
        F: FnMut(&mut Scene, &E) + 'static,
    {
        let key = event_key::<E>();
        if key >= self.handlers.len() {
            self.handlers.resize_with(key + 1, Vec::new);
        }
        self.handlers[key].push(EventHandler {
            subscription_id,
            callback: Box::new(move |ctx, event| {
                let scene = unsafe { &mut *ctx };
                let event = unsafe { &*(event as *const E) };
                callback(scene, event);
            }),
        });
    }

    pub(crate) fn remove_handler(&mut self, subscription_id: usize) {
        for list in &mut self.handlers {
            list.retain(|handler| handler.subscription_id != subscription_id);
        }
    }
}

/// Scoped event subscription handle.
///
/// Returned by [`Scene::subscribe`]; dropping it unregisters the handler. The
/// handle holds a raw back-reference to the scene's dispatcher and must not
/// outlive the scene it came from.
pub struct Subscription {
    dispatcher: *mut EventDispatcher,
    id: usize,
}

impl Subscription {
    pub(crate) fn new(dispatcher: *mut EventDispatcher, id: usize) -> Self {
        Self { dispatcher, id }
    }

    /// The numeric subscription id, as returned by
    /// [`Scene::add_handler`](crate::Scene::add_handler).
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        unsafe { (*self.dispatcher).remove_handler(self.id) };
    }
}
