use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::BlockShapeError;

/// Maximum number of cells a single block may occupy.
pub const MAX_BLOCK_SIZE: usize = 10;

/// A cell coordinate or an offset from a block center.
///
/// Row 0 is the top of the board and rows increase downward; columns increase
/// rightward. Coordinates are signed because offsets and candidate positions may
/// fall outside the board.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub row: i32,
    pub col: i32,
}

impl Point {
    #[must_use]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    #[must_use]
    pub const fn shifted(self, rows: i32, cols: i32) -> Self {
        Self::new(self.row + rows, self.col + cols)
    }

    /// Rotates an offset by 90°: `(row, col) → (col, -row)`.
    #[must_use]
    pub const fn rotated(self) -> Self {
        Self::new(self.col, -self.row)
    }
}

/// Type id of a block shape, as listed in its catalog.
///
/// Locked cells store `kind + 1` in the bitmap so that `0` stays free for empty cells.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct BlockKind(u8);

impl BlockKind {
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Value written into the bitmap when a block of this kind is locked.
    #[must_use]
    pub const fn cell_value(self) -> u8 {
        self.0 + 1
    }
}

/// A block placed somewhere on (or near) the board.
///
/// Blocks are values: movement and rotation return new instances and never mutate
/// `self`. Whether a block is legal is decided by the board, not by the block.
///
/// # Example
///
/// ```
/// use dropblox_engine::{Block, BlockKind, Point};
///
/// let block = Block::new(
///     BlockKind::new(0),
///     Point::new(5, 6),
///     [Point::new(0, 0), Point::new(0, 1)],
/// )
/// .unwrap();
/// let moved = block.left().rotated();
/// assert_eq!(moved.center(), Point::new(5, 5));
/// assert_eq!(moved.offsets()[1], Point::new(1, 0));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    kind: BlockKind,
    center: Point,
    offsets: ArrayVec<Point, MAX_BLOCK_SIZE>,
}

impl Block {
    pub fn new<I>(kind: BlockKind, center: Point, offsets: I) -> Result<Self, BlockShapeError>
    where
        I: IntoIterator<Item = Point>,
    {
        let mut cells = ArrayVec::new();
        for (i, offset) in offsets.into_iter().enumerate() {
            cells
                .try_push(offset)
                .map_err(|_| BlockShapeError::TooLarge(i + 1))?;
        }
        if cells.is_empty() {
            return Err(BlockShapeError::Empty);
        }
        Ok(Self {
            kind,
            center,
            offsets: cells,
        })
    }

    #[must_use]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[must_use]
    pub fn center(&self) -> Point {
        self.center
    }

    #[must_use]
    pub fn offsets(&self) -> &[Point] {
        &self.offsets
    }

    /// Absolute board coordinates of every cell (offset + center).
    pub fn cells(&self) -> impl Iterator<Item = Point> + '_ {
        self.offsets
            .iter()
            .map(|offset| offset.shifted(self.center.row, self.center.col))
    }

    /// Number of rows spanned by the block's cells.
    #[must_use]
    pub fn height(&self) -> i32 {
        offsets_height(&self.offsets)
    }

    #[must_use]
    pub fn rotated(&self) -> Self {
        Self {
            kind: self.kind,
            center: self.center,
            offsets: self.offsets.iter().map(|o| o.rotated()).collect(),
        }
    }

    #[must_use]
    pub fn translated(&self, rows: i32, cols: i32) -> Self {
        Self {
            kind: self.kind,
            center: self.center.shifted(rows, cols),
            offsets: self.offsets.clone(),
        }
    }

    #[must_use]
    pub fn left(&self) -> Self {
        self.translated(0, -1)
    }

    #[must_use]
    pub fn right(&self) -> Self {
        self.translated(0, 1)
    }

    #[must_use]
    pub fn up(&self) -> Self {
        self.translated(-1, 0)
    }

    #[must_use]
    pub fn down(&self) -> Self {
        self.translated(1, 0)
    }
}

pub(crate) fn offsets_height(offsets: &[Point]) -> i32 {
    let min = offsets.iter().map(|o| o.row).min().unwrap_or(0);
    let max = offsets.iter().map(|o| o.row).max().unwrap_or(-1);
    max - min + 1
}
