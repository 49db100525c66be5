// A chess-themed demo without any real chess logic: two sides shuffle
// pieces around randomly and capture whatever they land on, until one side
// has nothing left.

use pecs::{Component, Direct, Entity, Scene};

#[derive(Clone, Copy, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}

impl Component for Position {
    type Storage = Direct<Position>;
}

// Tag components mark which side a piece belongs to.
struct White;

impl Component for White {
    type Storage = Direct<White>;
}

struct Black;

impl Component for Black {
    type Storage = Direct<Black>;
}

// Any type can be an event.
struct MoveEvent {
    id: Entity,
    to: Position,
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

fn main() {
    let mut scene = Scene::new();
    let mut rng = Lcg(0);

    // Two ranks of pieces per side.
    for x in 0..8 {
        for y in 0..2 {
            let id = scene.add_entity();
            scene.attach(id, Position { x, y });
            scene.attach(id, White);
        }
        for y in 6..8 {
            let id = scene.add_entity();
            scene.attach(id, Position { x, y });
            scene.attach(id, Black);
        }
    }

    // Capture system: when a move lands, remove any same-position piece of
    // the opposite side. Removing entities while iterating is safe; the
    // traversal batches automatically.
    let _capture = scene.subscribe::<MoveEvent, _>(|scene, event| {
        let mover_is_white = scene.has::<White>(event.id);
        let to = event.to;
        let mover = event.id;
        scene.for_each::<(&Position, Option<&White>), _>(|scene, id, (position, white)| {
            if id != mover && mover_is_white != white.is_some() && *position == to {
                scene.remove(id);
            }
        });
    });

    const STEPS: [(i32, i32); 8] = [
        (1, 1),
        (1, 0),
        (1, -1),
        (0, -1),
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, 1),
    ];

    let mut turn = 0u32;
    loop {
        let whites = scene.count::<White>();
        let blacks = scene.count::<Black>();
        if whites == 0 || blacks == 0 {
            println!(
                "game over after {} turns: {}",
                turn,
                if whites == 0 { "black wins" } else { "white wins" }
            );
            break;
        }

        // Pick a random piece of the side to move.
        let mut candidates = Vec::new();
        if turn % 2 == 0 {
            scene.for_each::<(&White,), _>(|_, id, _| candidates.push(id));
        } else {
            scene.for_each::<(&Black,), _>(|_, id, _| candidates.push(id));
        }
        let id = candidates[(rng.next() as usize) % candidates.len()];

        // Step in a random direction that stays on the board.
        let position = *scene.get::<Position>(id).unwrap();
        let mut dir = (rng.next() % 8) as usize;
        for _ in 0..8 {
            let (dx, dy) = STEPS[dir];
            let to = Position {
                x: position.x + dx,
                y: position.y + dy,
            };
            if (0..8).contains(&to.x) && (0..8).contains(&to.y) {
                *scene.get_mut::<Position>(id).unwrap() = to;
                scene.emit(MoveEvent { id, to });
                break;
            }
            dir = (dir + 1) % 8;
        }

        if turn % 100 == 0 {
            println!("turn {:5}: {} white, {} black", turn, whites, blacks);
        }
        turn += 1;
    }
}
