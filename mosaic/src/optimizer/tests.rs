use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::config::{ExecutionMode, RefinementMethod};
use crate::error::{Error, EstimationFailure};
use crate::grid::{GridPos, InMemoryTiles};
use crate::sinks::{DisplacementLog, RunStatistics};
use crate::testing::{init_tracing, SyntheticMosaic};

/// 3x3 grid of 100x100 tiles at 20% overlap whose translations are all off
/// the truth by (1, -1).
fn shifted_grid(mosaic: &SyntheticMosaic) -> TileGrid {
    let mut grid = mosaic.grid(0.9);
    for tile in grid.tiles_mut() {
        for dir in Direction::ALL {
            if let Some(t) = tile.translation_slot(dir) {
                t.x += 1;
                t.y -= 1;
            }
        }
    }
    grid
}

fn config(execution: ExecutionMode) -> OptimizationConfig {
    OptimizationConfig {
        execution,
        num_threads: 3,
        repeatability: Some(3),
        refinement: RefinementMethod::Exhaustive,
        ..OptimizationConfig::deterministic(5)
    }
}

fn counting_progress() -> (Progress, Arc<AtomicUsize>) {
    let total = Arc::new(AtomicUsize::new(0));
    let progress = Progress::new({
        let total = total.clone();
        move |n| {
            total.fetch_add(n, Ordering::SeqCst);
        }
    });
    (progress, total)
}

fn run(
    optimizer: &Optimizer,
    grid: &mut TileGrid,
    reader: &dyn TileReader,
) -> (Result<Outcome<OptimizationReport>>, DisplacementLog, RunStatistics) {
    let mut displacements = DisplacementLog::default();
    let mut statistics = RunStatistics::default();
    let outcome = optimizer.optimize(grid, reader, &mut displacements, &mut statistics);
    (outcome, displacements, statistics)
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn test_three_by_three_end_to_end() {
    init_tracing();
    let mosaic = SyntheticMosaic::new(3, 3, 100, 100, 20.0);

    for execution in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        let mut grid = shifted_grid(&mosaic);
        let (progress, progressed) = counting_progress();
        let optimizer =
            Optimizer::new(config(execution), progress, &CancelToken::new()).unwrap();

        let (outcome, _, statistics) = run(&optimizer, &mut grid, &mosaic.tiles());
        let report = outcome.unwrap().completed().unwrap();

        assert_eq!(report.seed, 5);
        assert_eq!(report.radius, 3);
        for dir in Direction::ALL {
            assert!((report.overlap.get(dir) - 20.0).abs() <= 2.0, "{execution:?} {dir}");
            assert_eq!(*report.valid_tiles.get(dir), 6);
            assert_eq!(report.filter.get(dir).estimated(), 0);
        }
        assert_eq!(report.refine, RefineStats { refined: 12, missing: 0 });
        assert_eq!(report.placement.placed, 9);
        assert!(report.placement.connectivity.is_none());
        assert_eq!(progressed.load(Ordering::SeqCst), Optimizer::progress_steps(&grid));

        for tile in grid.tiles() {
            assert_eq!(
                tile.position,
                Some(mosaic.position(tile.pos)),
                "{execution:?} {}",
                tile.pos
            );
            for dir in Direction::ALL {
                if let Some(t) = tile.translation(dir) {
                    assert_eq!(Some((t.x, t.y)), mosaic.true_translation(tile.pos, dir));
                    assert!(t.correlation > 3.9, "trusted translations are boosted");
                }
            }
        }
        assert_eq!(statistics.repeatability.north, Some(3));
        assert_eq!(statistics.valid_tiles.west, 6);
    }
}

#[test]
fn test_missing_tile_end_to_end() {
    let mosaic = SyntheticMosaic::new(3, 3, 100, 100, 20.0);
    let center = GridPos::new(1, 1);
    let mut grid = mosaic.grid(0.9);
    grid.tile_mut(center).exists = false;

    // The reader does not know the missing tile; reading it would fail.
    let mut tiles = InMemoryTiles::new();
    for tile in grid.tiles().iter().filter(|t| t.exists) {
        tiles.insert(tile.pos, mosaic.tile_pixels(tile.pos));
    }

    let (progress, progressed) = counting_progress();
    let optimizer = Optimizer::new(config(ExecutionMode::Parallel), progress, &CancelToken::new())
        .unwrap();
    let (outcome, _, _) = run(&optimizer, &mut grid, &tiles);
    let report = outcome.unwrap().completed().unwrap();

    assert_eq!(report.refine, RefineStats { refined: 8, missing: 4 });
    assert_eq!(progressed.load(Ordering::SeqCst), 12);
    assert_eq!(report.placement.placed, 8);
    assert!(report.placement.connectivity.is_none());
    assert_eq!(grid.tile(center).position, None);
    for (pos, dir) in [
        (center, Direction::North),
        (center, Direction::West),
        (GridPos::new(2, 1), Direction::North),
        (GridPos::new(1, 2), Direction::West),
    ] {
        assert_eq!(grid.tile(pos).translation(dir).unwrap().correlation, -1.0);
    }
}

#[test]
fn test_sequential_runs_are_reproducible() {
    let mosaic = SyntheticMosaic::new(3, 4, 80, 80, 20.0).with_jitter(1, 9);
    let config = OptimizationConfig {
        refinement: RefinementMethod::MultiPointHillClimb { start_points: 4 },
        ..OptimizationConfig::deterministic(77)
    };
    let optimizer = Optimizer::new(config, Progress::none(), &CancelToken::new()).unwrap();

    let mut first = mosaic.grid(0.8);
    let mut second = mosaic.grid(0.8);
    let a = run(&optimizer, &mut first, &mosaic.tiles()).0.unwrap().completed().unwrap();
    let b = run(&optimizer, &mut second, &mosaic.tiles()).0.unwrap().completed().unwrap();

    assert_eq!(a, b);
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[test]
fn test_displacements_are_recorded_before_optimization() {
    let mosaic = SyntheticMosaic::new(3, 3, 100, 100, 20.0);
    let mut grid = shifted_grid(&mosaic);
    let before = grid.clone();
    let optimizer =
        Optimizer::new(config(ExecutionMode::Sequential), Progress::none(), &CancelToken::new())
            .unwrap();

    let (outcome, displacements, _) = run(&optimizer, &mut grid, &mosaic.tiles());
    assert!(outcome.is_ok());

    assert_eq!(displacements.entries.len(), 12);
    for entry in &displacements.entries {
        let original = before.tile(entry.pos).translation(entry.direction).unwrap();
        assert_eq!(entry.translation, *original);
    }
    // Row-major, North before West.
    assert_eq!(displacements.entries[0].pos, GridPos::new(0, 1));
    assert_eq!(displacements.entries[1].pos, GridPos::new(0, 2));
    assert_eq!(displacements.entries[2].direction, Direction::North);
}

#[test]
fn test_statistics_time_every_stage() {
    let mosaic = SyntheticMosaic::new(3, 3, 100, 100, 20.0);
    let mut grid = shifted_grid(&mosaic);
    let optimizer =
        Optimizer::new(config(ExecutionMode::Sequential), Progress::none(), &CancelToken::new())
            .unwrap();

    let (_, _, statistics) = run(&optimizer, &mut grid, &mosaic.tiles());

    let stages: Vec<Stage> = statistics.timers.iter().map(|&(s, _)| s).collect();
    assert_eq!(
        stages,
        vec![
            Stage::StageModel,
            Stage::Filter,
            Stage::Refinement,
            Stage::GlobalPositions,
            Stage::Total,
        ]
    );
    let total = statistics.timer(Stage::Total).unwrap();
    assert!(total >= statistics.timer(Stage::Refinement).unwrap());
    assert!(statistics.overlap.north.is_some() && statistics.overlap.west.is_some());
}

#[test]
fn test_report_serializes() {
    let mosaic = SyntheticMosaic::new(3, 3, 100, 100, 20.0);
    let mut grid = shifted_grid(&mosaic);
    let optimizer =
        Optimizer::new(config(ExecutionMode::Sequential), Progress::none(), &CancelToken::new())
            .unwrap();
    let report = run(&optimizer, &mut grid, &mosaic.tiles()).0.unwrap().completed().unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["seed"], 5);
    assert_eq!(json["refine"]["refined"], 12);
    assert_eq!(json["placement"]["placed"], 9);
    assert_eq!(json["filter"]["north"]["valid"], 6);
}

// ---------------------------------------------------------------------------
// Failures and cancellation
// ---------------------------------------------------------------------------

#[test]
fn test_invalid_config_is_rejected() {
    let config = OptimizationConfig {
        num_threads: 0,
        ..OptimizationConfig::default()
    };
    let err = Optimizer::new(config, Progress::none(), &CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_estimation_failure_stops_the_pass() {
    let mut grid = TileGrid::new(3, 3, 100, 100);
    let optimizer = Optimizer::new(
        OptimizationConfig::deterministic(1),
        Progress::none(),
        &CancelToken::new(),
    )
    .unwrap();

    let (outcome, displacements, statistics) = run(&optimizer, &mut grid, &InMemoryTiles::new());

    assert!(matches!(
        outcome,
        Err(Error::Estimation {
            reason: EstimationFailure::NoTranslations,
            ..
        })
    ));
    assert!(displacements.entries.is_empty());
    assert!(statistics.timer(Stage::Total).is_some());
    assert!(statistics.timer(Stage::Filter).is_none());
    assert!(grid.tiles().iter().all(|t| t.position.is_none()));
}

#[test]
fn test_cancelled_token_stops_the_pass() {
    let mosaic = SyntheticMosaic::new(3, 3, 100, 100, 20.0);
    let cancel = CancelToken::new();
    cancel.cancel();
    let optimizer =
        Optimizer::new(config(ExecutionMode::Sequential), Progress::none(), &cancel).unwrap();

    let mut grid = shifted_grid(&mosaic);
    let (outcome, _, statistics) = run(&optimizer, &mut grid, &mosaic.tiles());

    assert!(outcome.unwrap().is_cancelled());
    assert!(statistics.timer(Stage::Total).is_some());
    assert!(grid.tiles().iter().all(|t| t.position.is_none()));
}

#[test]
fn test_optimizer_cancel_leaves_caller_token() {
    let mosaic = SyntheticMosaic::new(3, 3, 100, 100, 20.0);
    let cancel = CancelToken::new();
    let optimizer =
        Optimizer::new(config(ExecutionMode::Parallel), Progress::none(), &cancel).unwrap();
    optimizer.cancel();

    let mut grid = shifted_grid(&mosaic);
    let (outcome, _, _) = run(&optimizer, &mut grid, &mosaic.tiles());

    assert!(outcome.unwrap().is_cancelled());
    assert!(!cancel.is_cancelled());
}

#[test]
fn test_progress_steps_count_adjacent_pairs() {
    assert_eq!(Optimizer::progress_steps(&TileGrid::new(3, 3, 10, 10)), 12);
    assert_eq!(Optimizer::progress_steps(&TileGrid::new(1, 4, 10, 10)), 3);
    assert_eq!(Optimizer::progress_steps(&TileGrid::new(1, 1, 10, 10)), 0);
}
