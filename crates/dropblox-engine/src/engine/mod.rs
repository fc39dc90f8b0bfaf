//! Game rules on top of the core grid and block types.
//!
//! - [`Board`] - One game: bitmap, current/held/preview blocks, score, status
//! - [`Command`] - Move tokens accepted by [`Board::send_commands`]
//! - [`TurnReport`] - What a turn did, including discarded commands
//! - [`BlockSpawner`] - Seeded, score-dependent block generation
//! - [`GameSnapshot`] - Serializable view of a board
//!
//! # Turn Flow
//!
//! 1. The agent inspects a [`GameSnapshot`] and replies with move tokens
//! 2. [`Board::send_commands`] applies the legal moves, then drops the block
//! 3. Full rows are cleared and scored as `2^n − 1`
//! 4. The next preview block becomes current and a new one is spawned
//! 5. If the new block has no legal position the game is over
//!
//! # Example
//!
//! ```
//! use dropblox_engine::{Board, BoardSeed, Command};
//!
//! let mut board = Board::new(BoardSeed::new(0));
//! while board.state().is_playing() {
//!     board.send_commands([Command::Rotate]);
//! }
//! assert!(board.send_commands([Command::Drop]).discarded.is_empty());
//! ```

pub use self::{board::*, command::*, snapshot::*, spawn::*};

mod board;
mod command;
mod snapshot;
mod spawn;
