use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pecs::{Component, Direct, Entity, Scene};

struct Small {
    data: u32,
}

impl Component for Small {
    type Storage = Direct<Small>;
}

struct Large {
    data: u32,
    _pad: [u32; 99],
}

impl Component for Large {
    type Storage = Direct<Large>;
}

struct Tag;

impl Component for Tag {
    type Storage = Direct<Tag>;
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

    fn chance(&mut self, one_in: u32) -> bool {
        self.next() % one_in == 0
    }
}

fn populated_scene(n: u32) -> (Scene, Vec<Entity>) {
    let mut scene = Scene::new();
    let mut rng = Lcg(0);
    let mut ids = Vec::with_capacity(n as usize);
    for i in 0..n {
        let id = scene.add_entity();
        if rng.chance(10) {
            scene.attach(id, Tag);
        }
        if rng.chance(10) {
            scene.attach(id, Small { data: i });
        }
        if rng.chance(10) {
            scene.attach(
                id,
                Large {
                    data: i,
                    _pad: [0; 99],
                },
            );
        }
        ids.push(id);
    }
    (scene, ids)
}

fn bench_random_access(c: &mut Criterion) {
    let (scene, ids) = populated_scene(1 << 16);
    let mut rng = Lcg(1);
    let mut shuffled = ids;
    for i in (1..shuffled.len()).rev() {
        let j = (rng.next() as usize) % (i + 1);
        shuffled.swap(i, j);
    }
    c.bench_function("random_access_small", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for &id in &shuffled {
                total += scene.get::<Small>(black_box(id)).is_some() as usize;
            }
            black_box(total)
        })
    });
    c.bench_function("random_access_large", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for &id in &shuffled {
                total += scene.get::<Large>(black_box(id)).is_some() as usize;
            }
            black_box(total)
        })
    });
}

fn bench_joins(c: &mut Criterion) {
    let (mut scene, _) = populated_scene(1 << 18);
    c.bench_function("join_required_pair", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            scene.for_each::<(&Small, &Large), _>(|_, _, (small, large)| {
                sum += (small.data + large.data) as u64;
            });
            black_box(sum)
        })
    });
    c.bench_function("join_with_optional", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            scene.for_each::<(&Small, Option<&Tag>), _>(|_, _, (small, tag)| {
                sum += small.data as u64 + tag.is_some() as u64;
            });
            black_box(sum)
        })
    });
}

fn bench_batched_churn(c: &mut Criterion) {
    c.bench_function("batched_insert_erase_commit", |b| {
        b.iter(|| {
            let mut scene = Scene::new();
            scene.start_batch();
            for id in 1..10_000u32 {
                scene.attach(id, Small { data: id });
            }
            for id in (1..10_000u32).step_by(2) {
                scene.detach::<Small>(id);
            }
            scene.finish_batch();
            black_box(scene.count::<Small>())
        })
    });
}

fn bench_aging_generations(c: &mut Criterion) {
    struct Age {
        years: u32,
    }
    struct Alive;
    struct DeadTag;
    impl Component for Age {
        type Storage = Direct<Age>;
    }
    impl Component for Alive {
        type Storage = Direct<Alive>;
    }
    impl Component for DeadTag {
        type Storage = Direct<DeadTag>;
    }

    c.bench_function("aging_generation", |b| {
        let mut scene = Scene::new();
        for _ in 0..10_000 {
            let id = scene.add_entity();
            scene.attach(id, Age { years: 0 });
            scene.attach(id, Alive);
        }
        let mut rng = Lcg(0);
        b.iter(|| {
            scene.for_each::<(&mut Age, &Alive), _>(|scene, id, (age, _)| {
                age.years += 1;
                if age.years > 40 && rng.chance(10) {
                    scene.detach::<Alive>(id);
                    scene.attach(id, DeadTag);
                }
            });
        })
    });
}

criterion_group!(
    benches,
    bench_random_access,
    bench_joins,
    bench_batched_churn,
    bench_aging_generations
);
criterion_main!(benches);
