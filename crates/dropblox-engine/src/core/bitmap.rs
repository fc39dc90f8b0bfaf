use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CellOutOfBoundsError;

use super::block::{Block, Point};

/// Number of rows on the board.
pub const ROWS: usize = 33;
/// Number of columns on the board.
pub const COLS: usize = 12;

#[expect(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const ROWS_I32: i32 = ROWS as i32;

type Row = [u8; COLS];

const EMPTY_ROW: Row = [0; COLS];

/// Occupancy grid of locked cells.
///
/// Each cell holds `0` when empty, or the locked block's kind + 1. The grid always
/// has exactly [`ROWS`] rows of [`COLS`] cells; clearing rows shifts the remaining
/// rows down and refills the top with empty rows.
///
/// Serialized as a list of rows, each a list of small integers:
///
/// ```
/// use dropblox_engine::{Bitmap, COLS, ROWS};
///
/// let json = serde_json::to_value(Bitmap::EMPTY).unwrap();
/// assert_eq!(json.as_array().unwrap().len(), ROWS);
/// assert_eq!(json[0].as_array().unwrap().len(), COLS);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bitmap {
    rows: [Row; ROWS],
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::EMPTY
    }
}

fn cell_index(p: Point) -> Option<(usize, usize)> {
    let row = usize::try_from(p.row).ok().filter(|&r| r < ROWS)?;
    let col = usize::try_from(p.col).ok().filter(|&c| c < COLS)?;
    Some((row, col))
}

impl Bitmap {
    pub const EMPTY: Self = Self {
        rows: [EMPTY_ROW; ROWS],
    };

    #[must_use]
    pub fn rows(&self) -> &[[u8; COLS]; ROWS] {
        &self.rows
    }

    /// Returns the cell value, or `None` if `p` is out of bounds.
    #[must_use]
    pub fn get(&self, p: Point) -> Option<u8> {
        cell_index(p).map(|(row, col)| self.rows[row][col])
    }

    /// Returns `true` if `p` is inside the grid and unoccupied.
    #[must_use]
    pub fn is_free(&self, p: Point) -> bool {
        self.get(p) == Some(0)
    }

    /// Returns `true` if every cell of `block` is inside the grid and unoccupied.
    #[must_use]
    pub fn check(&self, block: &Block) -> bool {
        self.fits_shifted(block, 0)
    }

    /// Like [`Self::check`], with the block moved down by `rows`.
    #[must_use]
    pub fn fits_shifted(&self, block: &Block, rows: i32) -> bool {
        block.cells().all(|p| self.is_free(p.shifted(rows, 0)))
    }

    /// Number of rows `block` can fall before it would collide.
    ///
    /// A negative value means the block's current position is already illegal.
    #[must_use]
    pub fn rows_free(&self, block: &Block) -> i32 {
        let mut shift = 0;
        while shift <= ROWS_I32 && self.fits_shifted(block, shift) {
            shift += 1;
        }
        shift - 1
    }

    pub fn fill_cell(&mut self, p: Point, value: u8) -> Result<(), CellOutOfBoundsError> {
        let (row, col) = cell_index(p).ok_or(CellOutOfBoundsError {
            row: p.row,
            col: p.col,
        })?;
        self.rows[row][col] = value;
        Ok(())
    }

    /// Writes the block's cells, moved down by `rows`, into the grid.
    ///
    /// Callers must have checked the shifted position; out-of-bounds cells are skipped.
    pub(crate) fn fill_block_shifted(&mut self, block: &Block, rows: i32) {
        let value = block.kind().cell_value();
        for p in block.cells() {
            if let Some((row, col)) = cell_index(p.shifted(rows, 0)) {
                self.rows[row][col] = value;
            }
        }
    }

    /// Removes full rows and returns how many were removed.
    pub fn clear_rows(&mut self) -> usize {
        let mut count = 0;
        for y in (0..ROWS).rev() {
            if self.rows[y].iter().all(|&cell| cell != 0) {
                count += 1;
                continue;
            }
            if count > 0 {
                self.rows[y + count] = self.rows[y];
            }
        }
        self.rows[..count].fill(EMPTY_ROW);
        count
    }
}

/// Error returned when a deserialized bitmap has the wrong dimensions.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("bitmap must be {ROWS}x{COLS}, got {rows} rows (first bad row has {cols} cells)")]
pub struct BitmapShapeError {
    rows: usize,
    cols: usize,
}

impl TryFrom<Vec<Vec<u8>>> for Bitmap {
    type Error = BitmapShapeError;

    fn try_from(rows: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        let row_count = rows.len();
        let bad_cols = rows
            .iter()
            .map(Vec::len)
            .find(|&len| len != COLS)
            .unwrap_or(COLS);
        if row_count != ROWS || bad_cols != COLS {
            return Err(BitmapShapeError {
                rows: row_count,
                cols: bad_cols,
            });
        }
        let mut bitmap = Self::EMPTY;
        for (dst, src) in bitmap.rows.iter_mut().zip(rows) {
            dst.copy_from_slice(&src);
        }
        Ok(bitmap)
    }
}

impl Serialize for Bitmap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.rows.iter())
    }
}

impl<'de> Deserialize<'de> for Bitmap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rows = Vec::<Vec<u8>>::deserialize(deserializer)?;
        Self::try_from(rows).map_err(serde::de::Error::custom)
    }
}
