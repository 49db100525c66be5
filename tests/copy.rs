use std::collections::HashMap;

use pecs::{Component, Direct, Entity, Scene, Stable};

struct Tag;

impl Component for Tag {
    type Storage = Direct<Tag>;

    fn duplicate(&self) -> Option<Self> {
        Some(Tag)
    }
}

struct Normal {
    a: u32,
}

impl Component for Normal {
    type Storage = Direct<Normal>;

    fn duplicate(&self) -> Option<Self> {
        Some(Normal { a: self.a })
    }
}

struct Boxed {
    a: u32,
}

impl Component for Boxed {
    type Storage = Stable<Boxed>;

    fn duplicate(&self) -> Option<Self> {
        Some(Boxed { a: self.a })
    }
}

struct Uncopyable {
    a: u32,
}

impl Component for Uncopyable {
    type Storage = Direct<Uncopyable>;
}

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }
}

#[test]
fn copying_every_entity_preserves_duplicables() {
    let mut secondary = Scene::new();
    let mut primary = Scene::new();
    let mut rng = Lcg(5);
    let mut ids = Vec::new();
    for _ in 0..10_000 {
        let id = secondary.add_entity();
        if rng.next() % 2 != 0 {
            secondary.attach(id, Tag);
        }
        if rng.next() % 3 != 0 {
            secondary.attach(id, Normal { a: rng.next() });
        }
        if rng.next() % 4 != 0 {
            secondary.attach(id, Boxed { a: rng.next() });
        }
        if rng.next() % 5 != 0 {
            secondary.attach(id, Uncopyable { a: rng.next() });
        }
        ids.push(id);
    }

    // Copy in shuffled order.
    for i in (1..ids.len()).rev() {
        let j = (rng.next() as usize) % (i + 1);
        ids.swap(i, j);
    }
    let mut equivalence: HashMap<Entity, Entity> = HashMap::new();
    for &old_id in &ids {
        equivalence.insert(primary.copy(&secondary, old_id), old_id);
    }

    assert_eq!(primary.count::<Tag>(), secondary.count::<Tag>());
    assert_eq!(primary.count::<Normal>(), secondary.count::<Normal>());
    assert_eq!(primary.count::<Boxed>(), secondary.count::<Boxed>());
    assert_eq!(primary.count::<Uncopyable>(), 0);

    for (&new_id, &old_id) in &equivalence {
        assert_eq!(primary.has::<Tag>(new_id), secondary.has::<Tag>(old_id));
        assert_eq!(
            primary.has::<Normal>(new_id),
            secondary.has::<Normal>(old_id)
        );
        match (primary.get::<Normal>(new_id), secondary.get::<Normal>(old_id)) {
            (Some(copied), Some(original)) => assert_eq!(copied.a, original.a),
            (None, None) => {}
            other => panic!("presence mismatch: {:?}", other.0.is_some()),
        }
        match (primary.get::<Boxed>(new_id), secondary.get::<Boxed>(old_id)) {
            (Some(copied), Some(original)) => assert_eq!(copied.a, original.a),
            (None, None) => {}
            _ => panic!("boxed presence mismatch"),
        }
        assert!(!primary.has::<Uncopyable>(new_id));
    }
}

#[test]
fn copy_of_a_bare_entity_creates_a_bare_entity() {
    let mut secondary = Scene::new();
    let mut primary = Scene::new();
    let bare = secondary.add_entity();
    let new_id = primary.copy(&secondary, bare);
    assert!(!primary.has::<Tag>(new_id));
    assert_eq!(primary.count::<Tag>(), 0);
    // The id is real and usable.
    primary.attach(new_id, Tag);
    assert_eq!(primary.count::<Tag>(), 1);
}
