use std::collections::HashSet;

use super::*;

#[test]
fn test_neighbors_follow_adjacency() {
    assert_eq!(Direction::North.neighbor(GridPos::new(0, 3)), None);
    assert_eq!(
        Direction::North.neighbor(GridPos::new(2, 3)),
        Some(GridPos::new(1, 3))
    );
    assert_eq!(Direction::West.neighbor(GridPos::new(2, 0)), None);
    assert_eq!(
        Direction::West.neighbor(GridPos::new(2, 3)),
        Some(GridPos::new(2, 2))
    );
}

#[test]
fn test_direction_axes() {
    assert_eq!(Direction::North.primary_axis(), Axis::Y);
    assert_eq!(Direction::North.orthogonal_axis(), Axis::X);
    assert_eq!(Direction::West.primary_axis(), Axis::X);
    assert_eq!(Direction::West.orthogonal_axis(), Axis::Y);
    assert_eq!(Direction::West.to_string(), "west");
}

#[test]
fn test_range_per_direction() {
    let grid = TileGrid::new(2, 3, 640, 480);
    assert_eq!(grid.range(Direction::North), 480);
    assert_eq!(grid.range(Direction::West), 640);
    assert_eq!(grid.line_count(Direction::North), 2);
    assert_eq!(grid.line_count(Direction::West), 3);
}

#[test]
fn test_index_round_trips_position() {
    let grid = TileGrid::new(3, 4, 10, 10);
    for (i, tile) in grid.tiles().iter().enumerate() {
        assert_eq!(grid.index(tile.pos), i);
        assert_eq!(grid.pos_of(i), tile.pos);
    }
}

#[test]
fn test_set_translation_rejects_edge_slot() {
    let mut grid = TileGrid::new(2, 2, 10, 10);
    let t = CorrelationTriple::new(0, 8, 0.9);
    assert!(grid
        .set_translation(GridPos::new(0, 1), Direction::North, t)
        .is_err());
    assert!(grid
        .set_translation(GridPos::new(5, 0), Direction::West, t)
        .is_err());
    grid.set_translation(GridPos::new(1, 1), Direction::North, t)
        .unwrap();
    assert_eq!(grid.tile(GridPos::new(1, 1)).north, Some(t));
}

#[test]
fn test_translations_iterates_existing_slots() {
    let mut grid = TileGrid::new(2, 2, 10, 10);
    grid.set_translation(
        GridPos::new(0, 1),
        Direction::West,
        CorrelationTriple::new(8, 0, 0.7),
    )
    .unwrap();
    let west: Vec<_> = grid.translations(Direction::West).collect();
    assert_eq!(west.len(), 1);
    assert_eq!(west[0].0, GridPos::new(0, 1));
    assert_eq!(grid.translations(Direction::North).count(), 0);
}

#[test]
fn test_pair_touches_missing() {
    let mut grid = TileGrid::new(2, 2, 10, 10);
    grid.tile_mut(GridPos::new(0, 0)).exists = false;
    assert!(grid.pair_touches_missing(GridPos::new(1, 0), Direction::North));
    assert!(grid.pair_touches_missing(GridPos::new(0, 1), Direction::West));
    assert!(!grid.pair_touches_missing(GridPos::new(1, 1), Direction::North));
    assert!(!grid.pair_touches_missing(GridPos::new(0, 0), Direction::North));
}

#[test]
fn test_tile_correlation_ignores_nan() {
    let mut tile = Tile::new(GridPos::new(0, 0));
    tile.update_tile_correlation(0.4);
    tile.update_tile_correlation(f64::NAN);
    tile.update_tile_correlation(0.2);
    assert_eq!(tile.tile_correlation, 0.4);
}

#[test]
fn test_estimate_is_nan_correlation() {
    let t = CorrelationTriple::estimate(3, 80);
    assert!(t.is_estimate());
    assert_eq!(t.component(Axis::X), 3);
    assert_eq!(t.component(Axis::Y), 80);
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

#[test]
fn test_diagonal_visits_every_tile_once() {
    for (rows, cols) in [(1, 1), (1, 5), (4, 1), (3, 7), (6, 4)] {
        let order = diagonal_order(rows, cols);
        assert_eq!(order.len(), rows * cols);
        let unique: HashSet<_> = order.iter().copied().collect();
        assert_eq!(unique.len(), rows * cols);
    }
}

#[test]
fn test_diagonal_emits_neighbors_first() {
    let order = diagonal_order(5, 3);
    let rank = |p: GridPos| order.iter().position(|&q| q == p).unwrap();
    for &pos in &order {
        for dir in Direction::ALL {
            if let Some(n) = dir.neighbor(pos) {
                assert!(rank(n) < rank(pos), "{n} must precede {pos}");
            }
        }
    }
}

#[test]
fn test_diagonal_order_small_grid() {
    let order = diagonal_order(2, 3);
    let expected = [(0, 0), (0, 1), (1, 0), (0, 2), (1, 1), (1, 2)]
        .map(|(r, c)| GridPos::new(r, c));
    assert_eq!(order, expected);
}

#[test]
fn test_in_memory_reader_reports_missing() {
    let mut tiles = InMemoryTiles::new();
    tiles.insert(GridPos::new(0, 0), common::Buffer2::new_filled(2, 2, 1.0));
    assert!(tiles.read(GridPos::new(0, 0)).is_ok());
    assert!(matches!(
        tiles.read(GridPos::new(0, 1)),
        Err(Error::TileRead { .. })
    ));
}
