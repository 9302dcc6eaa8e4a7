//! Tile grid data model.
//!
//! A grid holds `rows x cols` tiles in row-major order. Every tile owns the
//! translations to its North and West neighbors; a translation is "tile minus
//! neighbor", i.e. `position(tile) = position(neighbor) + (x, y)`.

mod reader;
mod traversal;

#[cfg(test)]
mod tests;

pub use reader::{InMemoryTiles, TileReader};
pub use traversal::diagonal_order;

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::{Error, Result};

/// Row/column address of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub row: usize,
    pub col: usize,
}

impl GridPos {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Displacement axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// Neighbor direction a translation points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    North,
    West,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::North, Direction::West];

    /// Axis along which the tiles are displaced: Y for North, X for West.
    #[inline]
    pub fn primary_axis(self) -> Axis {
        match self {
            Direction::North => Axis::Y,
            Direction::West => Axis::X,
        }
    }

    #[inline]
    pub fn orthogonal_axis(self) -> Axis {
        match self {
            Direction::North => Axis::X,
            Direction::West => Axis::Y,
        }
    }

    /// Neighbor of `pos` in this direction, `None` on the first row/column.
    #[inline]
    pub fn neighbor(self, pos: GridPos) -> Option<GridPos> {
        match self {
            Direction::North => pos.row.checked_sub(1).map(|row| GridPos::new(row, pos.col)),
            Direction::West => pos.col.checked_sub(1).map(|col| GridPos::new(pos.row, col)),
        }
    }
}

/// A value kept separately for North and West.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerDirection<T> {
    pub north: T,
    pub west: T,
}

impl<T> PerDirection<T> {
    pub fn from_fn(mut f: impl FnMut(Direction) -> T) -> Self {
        Self {
            north: f(Direction::North),
            west: f(Direction::West),
        }
    }

    #[inline]
    pub fn get(&self, dir: Direction) -> &T {
        match dir {
            Direction::North => &self.north,
            Direction::West => &self.west,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, dir: Direction) -> &mut T {
        match dir {
            Direction::North => &mut self.north,
            Direction::West => &mut self.west,
        }
    }
}

/// One pairwise translation: offset plus the correlation that supports it.
///
/// A NaN correlation marks an invalid or estimated translation, a negative one
/// a translation that touches a tile missing on disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationTriple {
    pub x: i32,
    pub y: i32,
    pub correlation: f64,
}

impl CorrelationTriple {
    pub const fn new(x: i32, y: i32, correlation: f64) -> Self {
        Self { x, y, correlation }
    }

    /// Offset that is not backed by a measurement.
    pub const fn estimate(x: i32, y: i32) -> Self {
        Self::new(x, y, f64::NAN)
    }

    #[inline]
    pub fn is_estimate(&self) -> bool {
        self.correlation.is_nan()
    }

    #[inline]
    pub fn component(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }
}

impl fmt::Display for CorrelationTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {:.4})", self.x, self.y, self.correlation)
    }
}

/// A grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub pos: GridPos,
    /// Whether the tile image exists on disk.
    pub exists: bool,
    pub north: Option<CorrelationTriple>,
    pub west: Option<CorrelationTriple>,
    /// Best correlation seen on this tile's own edges.
    pub tile_correlation: f64,
    /// Absolute position, assigned by [`crate::position`].
    pub position: Option<(i64, i64)>,
}

impl Tile {
    pub fn new(pos: GridPos) -> Self {
        Self {
            pos,
            exists: true,
            north: None,
            west: None,
            tile_correlation: -1.0,
            position: None,
        }
    }

    #[inline]
    pub fn translation(&self, dir: Direction) -> Option<&CorrelationTriple> {
        match dir {
            Direction::North => self.north.as_ref(),
            Direction::West => self.west.as_ref(),
        }
    }

    #[inline]
    pub fn translation_slot(&mut self, dir: Direction) -> &mut Option<CorrelationTriple> {
        match dir {
            Direction::North => &mut self.north,
            Direction::West => &mut self.west,
        }
    }

    /// Raises `tile_correlation` to `correlation` if larger. NaN is ignored.
    #[inline]
    pub fn update_tile_correlation(&mut self, correlation: f64) {
        self.tile_correlation = self.tile_correlation.max(correlation);
    }
}

/// Rectangular grid of equally sized tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    rows: usize,
    cols: usize,
    tile_width: usize,
    tile_height: usize,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Creates a grid where every tile exists and no translation is set.
    pub fn new(rows: usize, cols: usize, tile_width: usize, tile_height: usize) -> Self {
        assert!(rows > 0 && cols > 0, "grid must have at least one tile");
        assert!(
            tile_width > 0 && tile_height > 0,
            "tile dimensions must be positive"
        );
        let tiles = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| Tile::new(GridPos::new(row, col))))
            .collect();
        Self {
            rows,
            cols,
            tile_width,
            tile_height,
            tiles,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn tile_width(&self) -> usize {
        self.tile_width
    }

    #[inline]
    pub fn tile_height(&self) -> usize {
        self.tile_height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Pixel extent along the primary axis of `dir`: height for North, width for West.
    #[inline]
    pub fn range(&self, dir: Direction) -> usize {
        match dir {
            Direction::North => self.tile_height,
            Direction::West => self.tile_width,
        }
    }

    /// Row-major index of `pos`.
    #[inline]
    pub fn index(&self, pos: GridPos) -> usize {
        debug_assert!(self.contains(pos));
        pos.row * self.cols + pos.col
    }

    #[inline]
    pub fn pos_of(&self, index: usize) -> GridPos {
        GridPos::new(index / self.cols, index % self.cols)
    }

    #[inline]
    pub fn contains(&self, pos: GridPos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    #[inline]
    pub fn tile(&self, pos: GridPos) -> &Tile {
        &self.tiles[self.index(pos)]
    }

    #[inline]
    pub fn tile_mut(&mut self, pos: GridPos) -> &mut Tile {
        let idx = self.index(pos);
        &mut self.tiles[idx]
    }

    /// Checked lookup for positions coming from outside the crate.
    pub fn try_tile_mut(&mut self, pos: GridPos) -> Result<&mut Tile> {
        if !self.contains(pos) {
            return Err(Error::GridMismatch(format!(
                "tile {pos} outside {}x{} grid",
                self.rows, self.cols
            )));
        }
        Ok(self.tile_mut(pos))
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    /// Sets the translation from `pos` to its neighbor in `dir`.
    pub fn set_translation(
        &mut self,
        pos: GridPos,
        dir: Direction,
        translation: CorrelationTriple,
    ) -> Result<()> {
        if dir.neighbor(pos).is_none() {
            return Err(Error::GridMismatch(format!(
                "tile {pos} has no {dir} neighbor"
            )));
        }
        *self.try_tile_mut(pos)?.translation_slot(dir) = Some(translation);
        Ok(())
    }

    /// Positions that have a neighbor in `dir`, row-major.
    pub fn positions_with_neighbor(&self, dir: Direction) -> impl Iterator<Item = GridPos> + '_ {
        self.tiles
            .iter()
            .map(|t| t.pos)
            .filter(move |&pos| dir.neighbor(pos).is_some())
    }

    /// Existing translations in `dir`, row-major.
    pub fn translations(
        &self,
        dir: Direction,
    ) -> impl Iterator<Item = (GridPos, &CorrelationTriple)> + '_ {
        self.tiles
            .iter()
            .filter_map(move |t| t.translation(dir).map(|tr| (t.pos, tr)))
    }

    /// Index of the line a translation is grouped by: row for North, column for West.
    #[inline]
    pub fn line_of(&self, pos: GridPos, dir: Direction) -> usize {
        match dir {
            Direction::North => pos.row,
            Direction::West => pos.col,
        }
    }

    /// Number of lines for `dir`: rows for North, columns for West.
    #[inline]
    pub fn line_count(&self, dir: Direction) -> usize {
        match dir {
            Direction::North => self.rows,
            Direction::West => self.cols,
        }
    }

    /// True when either tile of the pair `(pos, neighbor in dir)` is missing on disk.
    pub fn pair_touches_missing(&self, pos: GridPos, dir: Direction) -> bool {
        let Some(neighbor) = dir.neighbor(pos) else {
            return false;
        };
        !self.tile(pos).exists || !self.tile(neighbor).exists
    }

    /// Clears every absolute position.
    pub fn clear_positions(&mut self) {
        for tile in &mut self.tiles {
            tile.position = None;
        }
    }
}
