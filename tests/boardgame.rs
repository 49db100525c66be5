use pecs::{Component, Direct, Entity, Scene};

#[derive(Clone, Copy, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}

impl Component for Position {
    type Storage = Direct<Position>;
}

struct White;

impl Component for White {
    type Storage = Direct<White>;
}

struct Black;

impl Component for Black {
    type Storage = Direct<Black>;
}

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

fn setup_board(scene: &mut Scene) {
    // Two ranks per side on an 8x8 board, 32 pieces total.
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
}

/// Captures any same-position piece of the opposite side when a move lands.
fn install_piece_remover(scene: &mut Scene) -> pecs::Subscription {
    scene.subscribe::<MoveEvent, _>(|scene, event| {
        let mover_is_white = scene.has::<White>(event.id);
        let to = event.to;
        let mover = event.id;
        scene.for_each::<(&Position, Option<&White>), _>(|scene, id, (position, white)| {
            if id != mover
                && mover_is_white != white.is_some()
                && position.x == to.x
                && position.y == to.y
            {
                scene.remove(id);
            }
        });
    })
}

#[test]
fn pieces_capture_until_one_side_is_gone() {
    let mut scene = Scene::new();
    setup_board(&mut scene);
    assert_eq!(scene.count::<White>(), 16);
    assert_eq!(scene.count::<Black>(), 16);
    assert_eq!(scene.count::<Position>(), 32);

    let _remover = install_piece_remover(&mut scene);

    let mut game_over_flips = 0u32;
    let mut game_over = false;

    let mut rng = Lcg(2024);
    let mut turn = 0u32;
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

    while !game_over && turn < 100_000 {
        // Pick a random piece of the side to move.
        let id = if turn % 2 == 0 {
            let mut whites = Vec::new();
            scene.for_each::<(&White,), _>(|_, id, _| whites.push(id));
            whites[(rng.next() as usize) % whites.len()]
        } else {
            let mut blacks = Vec::new();
            scene.for_each::<(&Black,), _>(|_, id, _| blacks.push(id));
            blacks[(rng.next() as usize) % blacks.len()]
        };

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

        let whites = scene.count::<White>();
        let blacks = scene.count::<Black>();
        assert_eq!(
            scene.count::<Position>(),
            whites + blacks,
            "every piece keeps its position component"
        );
        if (whites == 0 || blacks == 0) && !game_over {
            game_over = true;
            game_over_flips += 1;
        }
        turn += 1;
    }

    assert!(game_over, "one side must eventually run out of pieces");
    assert_eq!(game_over_flips, 1, "the game-over flag flips exactly once");
    let whites = scene.count::<White>();
    let blacks = scene.count::<Black>();
    assert!(whites == 0 || blacks == 0);
    assert!(whites + blacks > 0, "the winning side keeps its pieces");
}
