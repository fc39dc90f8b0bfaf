use std::sync::{Arc, LazyLock};

use arrayvec::ArrayVec;

use crate::{BlockShapeError, CatalogError};

use super::{
    bitmap::COLS,
    block::{Block, BlockKind, MAX_BLOCK_SIZE, Point, offsets_height},
};

/// Immutable template of a block: its type id, cell offsets and spawn center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockShape {
    kind: BlockKind,
    offsets: ArrayVec<Point, MAX_BLOCK_SIZE>,
    spawn_center: Point,
}

impl BlockShape {
    fn new(kind: BlockKind, cells: &[(i32, i32)]) -> Result<Self, BlockShapeError> {
        if cells.is_empty() {
            return Err(BlockShapeError::Empty);
        }
        if cells.len() > MAX_BLOCK_SIZE {
            return Err(BlockShapeError::TooLarge(cells.len()));
        }
        let offsets: ArrayVec<Point, MAX_BLOCK_SIZE> =
            cells.iter().map(|&(row, col)| Point::new(row, col)).collect();
        // Shapes spawn so that their bottom edge sits near row MAX_BLOCK_SIZE,
        // horizontally centered.
        #[expect(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let spawn_center = Point::new(
            MAX_BLOCK_SIZE as i32 - offsets_height(&offsets),
            (COLS / 2) as i32,
        );
        Ok(Self {
            kind,
            offsets,
            spawn_center,
        })
    }

    #[must_use]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[must_use]
    pub fn offsets(&self) -> &[Point] {
        &self.offsets
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        offsets_height(&self.offsets)
    }

    #[must_use]
    pub fn spawn_center(&self) -> Point {
        self.spawn_center
    }

    /// Creates a fresh block of this shape at its spawn position.
    #[must_use]
    pub fn spawn(&self) -> Block {
        Block::new(self.kind, self.spawn_center, self.offsets.iter().copied())
            .expect("catalog shapes are validated at construction")
    }
}

/// Table of block shapes partitioned into difficulty tiers.
///
/// Shapes are numbered in tier order, so tier `k` covers the shape ids
/// `cumulative_count(k - 1)..cumulative_count(k)`. Harder tiers hold larger shapes.
///
/// # Example
///
/// ```
/// use dropblox_engine::BlockCatalog;
///
/// let catalog = BlockCatalog::standard();
/// assert_eq!(catalog.tier_count(), 3);
/// assert_eq!(catalog.cumulative_count(0), 7);
/// assert_eq!(catalog.len(), 33);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCatalog {
    shapes: Vec<BlockShape>,
    cumulative_counts: Vec<usize>,
}

static STANDARD_CATALOG: LazyLock<Arc<BlockCatalog>> = LazyLock::new(|| {
    Arc::new(
        BlockCatalog::new(&[TETROMINOES, PENTOMINOES, HEXOMINOES])
            .expect("standard catalog is well-formed"),
    )
});

impl BlockCatalog {
    /// Builds a catalog from tiers of shapes, each shape given as `(row, col)` offsets.
    pub fn new(tiers: &[&[&[(i32, i32)]]]) -> Result<Self, CatalogError> {
        if tiers.is_empty() {
            return Err(CatalogError::NoTiers);
        }
        let total = tiers.iter().map(|tier| tier.len()).sum::<usize>();
        if total > usize::from(u8::MAX - 1) {
            return Err(CatalogError::TooManyShapes(total));
        }

        let mut shapes = Vec::with_capacity(total);
        let mut cumulative_counts = Vec::with_capacity(tiers.len());
        for (tier_index, tier) in tiers.iter().enumerate() {
            if tier.is_empty() {
                return Err(CatalogError::EmptyTier(tier_index));
            }
            for cells in *tier {
                let index = shapes.len();
                let kind = BlockKind::new(u8::try_from(index).map_err(|_| {
                    CatalogError::TooManyShapes(total)
                })?);
                let shape = BlockShape::new(kind, cells)
                    .map_err(|source| CatalogError::InvalidShape { index, source })?;
                shapes.push(shape);
            }
            cumulative_counts.push(shapes.len());
        }
        Ok(Self {
            shapes,
            cumulative_counts,
        })
    }

    /// The catalog used by regular games: tetrominoes, pentominoes, then hexominoes.
    #[must_use]
    pub fn standard() -> Arc<Self> {
        Arc::clone(&STANDARD_CATALOG)
    }

    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.cumulative_counts.len()
    }

    /// Number of shapes in tiers `0..=tier`.
    #[must_use]
    pub fn cumulative_count(&self, tier: usize) -> usize {
        self.cumulative_counts[tier]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    #[must_use]
    pub fn shape(&self, kind: BlockKind) -> Option<&BlockShape> {
        self.shapes.get(kind.index())
    }

    #[must_use]
    pub fn shapes(&self) -> &[BlockShape] {
        &self.shapes
    }
}

const TETROMINOES: &[&[(i32, i32)]] = &[
    // O
    &[(0, 0), (0, 1), (1, 0), (1, 1)],
    // I
    &[(0, -1), (0, 0), (0, 1), (0, 2)],
    // T
    &[(0, -1), (0, 0), (0, 1), (1, 0)],
    // S
    &[(0, 0), (0, 1), (1, -1), (1, 0)],
    // Z
    &[(0, -1), (0, 0), (1, 0), (1, 1)],
    // J
    &[(0, -1), (0, 0), (0, 1), (1, 1)],
    // L
    &[(0, -1), (0, 0), (0, 1), (1, -1)],
];

const PENTOMINOES: &[&[(i32, i32)]] = &[
    // I
    &[(0, -2), (0, -1), (0, 0), (0, 1), (0, 2)],
    // L and its mirror
    &[(0, -1), (0, 0), (0, 1), (0, 2), (1, -1)],
    &[(0, -2), (0, -1), (0, 0), (0, 1), (1, 1)],
    // P and its mirror
    &[(0, 0), (0, 1), (1, 0), (1, 1), (2, 0)],
    &[(0, 0), (0, 1), (1, 0), (1, 1), (2, 1)],
    // N and its mirror
    &[(0, -2), (0, -1), (1, -1), (1, 0), (1, 1)],
    &[(0, 1), (0, 2), (1, -1), (1, 0), (1, 1)],
    // T
    &[(-1, -1), (-1, 0), (-1, 1), (0, 0), (1, 0)],
    // U
    &[(0, -1), (0, 1), (1, -1), (1, 0), (1, 1)],
    // V
    &[(-1, -1), (0, -1), (1, -1), (1, 0), (1, 1)],
    // W
    &[(-1, -1), (0, -1), (0, 0), (1, 0), (1, 1)],
    // X
    &[(-1, 0), (0, -1), (0, 0), (0, 1), (1, 0)],
    // Y and its mirror
    &[(0, -1), (0, 0), (0, 1), (0, 2), (1, 0)],
    &[(0, -2), (0, -1), (0, 0), (0, 1), (1, 0)],
    // F and its mirror
    &[(-1, 0), (-1, 1), (0, -1), (0, 0), (1, 0)],
    &[(-1, -1), (-1, 0), (0, 0), (0, 1), (1, 0)],
    // Z and its mirror
    &[(-1, -1), (-1, 0), (0, 0), (1, 0), (1, 1)],
    &[(-1, 0), (-1, 1), (0, 0), (1, -1), (1, 0)],
];

const HEXOMINOES: &[&[(i32, i32)]] = &[
    &[(0, -2), (0, -1), (0, 0), (0, 1), (0, 2), (0, 3)],
    &[(0, -1), (0, 0), (0, 1), (1, -1), (1, 0), (1, 1)],
    &[(-2, 0), (-1, 0), (0, 0), (1, 0), (1, 1), (1, 2)],
    &[(-1, 0), (0, -1), (0, 0), (0, 1), (1, 0), (2, 0)],
    &[(-1, -1), (0, -1), (0, 0), (1, 0), (1, 1), (2, 1)],
    &[(0, -2), (0, -1), (0, 0), (0, 1), (0, 2), (1, 0)],
    &[(0, -1), (0, 2), (1, -1), (1, 0), (1, 1), (1, 2)],
    &[(-1, -1), (-1, 0), (-1, 1), (0, 1), (1, 1), (1, 0)],
];

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_standard_tiers() {
        let catalog = BlockCatalog::standard();
        assert_eq!(catalog.tier_count(), 3);
        assert_eq!(catalog.cumulative_count(0), 7);
        assert_eq!(catalog.cumulative_count(1), 25);
        assert_eq!(catalog.cumulative_count(2), 33);
    }

    #[test]
    fn test_tiers_grow_in_cell_count() {
        let catalog = BlockCatalog::standard();
        let mut start = 0;
        let mut prev_max = 0;
        for tier in 0..catalog.tier_count() {
            let end = catalog.cumulative_count(tier);
            let sizes: Vec<_> = catalog.shapes()[start..end]
                .iter()
                .map(|s| s.offsets().len())
                .collect();
            let min = *sizes.iter().min().unwrap();
            assert!(min > prev_max, "tier {tier} is not larger than tier {}", tier - 1);
            prev_max = *sizes.iter().max().unwrap();
            start = end;
        }
    }

    #[test]
    fn test_standard_shapes_are_distinct() {
        let catalog = BlockCatalog::standard();
        let mut seen = HashSet::new();
        for shape in catalog.shapes() {
            let mut cells = shape.offsets().to_vec();
            cells.sort_by_key(|p| (p.row, p.col));
            assert!(seen.insert(cells), "duplicate shape {:?}", shape.kind());
        }
    }

    #[test]
    fn test_spawn_positions_are_on_board() {
        let catalog = BlockCatalog::standard();
        for shape in catalog.shapes() {
            let block = shape.spawn();
            assert_eq!(block.kind(), shape.kind());
            assert_eq!(block.center().col, 6);
            assert_eq!(block.center().row, 10 - shape.height());
            assert!(crate::Bitmap::EMPTY.check(&block), "shape {:?}", shape.kind());
        }
    }

    #[test]
    fn test_kinds_follow_table_order() {
        let catalog = BlockCatalog::standard();
        for (i, shape) in catalog.shapes().iter().enumerate() {
            assert_eq!(shape.kind().index(), i);
            assert_eq!(catalog.shape(shape.kind()), Some(shape));
        }
    }

    #[test]
    fn test_new_rejects_malformed_tables() {
        assert!(matches!(BlockCatalog::new(&[]), Err(CatalogError::NoTiers)));
        assert!(matches!(
            BlockCatalog::new(&[&[&[(0, 0)]], &[]]),
            Err(CatalogError::EmptyTier(1))
        ));
        assert!(matches!(
            BlockCatalog::new(&[&[&[]]]),
            Err(CatalogError::InvalidShape {
                index: 0,
                source: BlockShapeError::Empty
            })
        ));
    }

    #[test]
    fn test_single_cell_catalog() {
        let catalog = BlockCatalog::new(&[&[&[(0, 0)]]]).unwrap();
        assert_eq!(catalog.tier_count(), 1);
        let block = catalog.shapes()[0].spawn();
        assert_eq!(block.center(), Point::new(9, 6));
    }
}
