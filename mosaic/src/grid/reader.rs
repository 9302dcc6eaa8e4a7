use std::collections::HashMap;
use std::sync::Arc;

use common::Buffer2;

use super::GridPos;
use crate::error::{Error, Result};

/// Pixel accessor for tiles. Decoding and caching policy live behind it.
///
/// Readers are shared by refinement workers, so they must be thread safe.
pub trait TileReader: Send + Sync {
    /// Loads the grayscale pixels of the tile at `pos`.
    fn read(&self, pos: GridPos) -> Result<Arc<Buffer2<f32>>>;
}

/// Reader over tiles that are already decoded.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTiles {
    tiles: HashMap<GridPos, Arc<Buffer2<f32>>>,
}

impl InMemoryTiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pos: GridPos, pixels: Buffer2<f32>) {
        self.tiles.insert(pos, Arc::new(pixels));
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl TileReader for InMemoryTiles {
    fn read(&self, pos: GridPos) -> Result<Arc<Buffer2<f32>>> {
        self.tiles.get(&pos).cloned().ok_or_else(|| Error::TileRead {
            pos,
            message: "tile not loaded".to_string(),
        })
    }
}
