pub use self::{core::*, engine::*};

pub mod core;
pub mod engine;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("block has no legal resting position")]
pub struct LockError;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("cell ({row}, {col}) is outside the bitmap")]
pub struct CellOutOfBoundsError {
    pub row: i32,
    pub col: i32,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum BlockShapeError {
    #[display("block must have at least one cell")]
    Empty,
    #[display("block has {_0} cells, at most {MAX_BLOCK_SIZE} are allowed")]
    TooLarge(#[error(not(source))] usize),
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum CatalogError {
    #[display("catalog must have at least one tier")]
    NoTiers,
    #[display("tier {_0} has no shapes")]
    EmptyTier(#[error(not(source))] usize),
    #[display("catalog has {_0} shapes, at most 254 are allowed")]
    TooManyShapes(#[error(not(source))] usize),
    #[display("invalid shape #{index}: {source}")]
    InvalidShape {
        index: usize,
        source: BlockShapeError,
    },
}
