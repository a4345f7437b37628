//! Tile addressing types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column/row of a tile inside a mosaic grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub col: u32,
    pub row: u32,
}

impl TileCoord {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.col, self.row)
    }
}

/// Globally unique tile key: (dataset, pyramid, mosaic, col, row).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub dataset: String,
    pub pyramid_id: String,
    pub mosaic_id: String,
    pub coord: TileCoord,
}

impl TileKey {
    pub fn new(
        dataset: impl Into<String>,
        pyramid_id: impl Into<String>,
        mosaic_id: impl Into<String>,
        coord: TileCoord,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            pyramid_id: pyramid_id.into(),
            mosaic_id: mosaic_id.into(),
            coord,
        }
    }

    /// Storage path for this tile.
    /// Format: {dataset}/{pyramid}/{mosaic}/{col}_{row}.tile
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}/{}_{}.tile",
            self.dataset, self.pyramid_id, self.mosaic_id, self.coord.col, self.coord.row
        )
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.dataset, self.pyramid_id, self.mosaic_id, self.coord
        )
    }
}

/// Half-open rectangle of tiles: `[col_min, col_max) x [row_min, row_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    pub col_min: u32,
    pub row_min: u32,
    pub col_max: u32,
    pub row_max: u32,
}

impl TileRange {
    pub fn new(col_min: u32, row_min: u32, col_max: u32, row_max: u32) -> Self {
        Self {
            col_min,
            row_min,
            col_max,
            row_max,
        }
    }

    pub fn empty() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn cols(&self) -> u32 {
        self.col_max.saturating_sub(self.col_min)
    }

    pub fn rows(&self) -> u32 {
        self.row_max.saturating_sub(self.row_min)
    }

    pub fn len(&self) -> usize {
        self.cols() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.cols() == 0 || self.rows() == 0
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.col >= self.col_min
            && coord.col < self.col_max
            && coord.row >= self.row_min
            && coord.row < self.row_max
    }

    /// Tiles in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> {
        let (col_min, col_max) = (self.col_min, self.col_max);
        (self.row_min..self.row_max)
            .flat_map(move |row| (col_min..col_max).map(move |col| TileCoord::new(col, row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_key_path() {
        let key = TileKey::new("dem", "p0", "m1", TileCoord::new(3, 7));
        assert_eq!(key.path(), "dem/p0/m1/3_7.tile");
    }

    #[test]
    fn test_range_iteration_is_row_major() {
        let range = TileRange::new(1, 4, 3, 6);
        let coords: Vec<_> = range.iter().collect();
        assert_eq!(
            coords,
            vec![
                TileCoord::new(1, 4),
                TileCoord::new(2, 4),
                TileCoord::new(1, 5),
                TileCoord::new(2, 5),
            ]
        );
        assert_eq!(range.len(), 4);
        assert!(range.contains(TileCoord::new(2, 5)));
        assert!(!range.contains(TileCoord::new(3, 5)));
    }

    #[test]
    fn test_empty_range() {
        assert!(TileRange::empty().is_empty());
        assert_eq!(TileRange::new(5, 5, 2, 9).len(), 0);
        assert_eq!(TileRange::empty().iter().count(), 0);
    }
}
