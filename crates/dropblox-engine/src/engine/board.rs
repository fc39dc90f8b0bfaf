use std::{collections::VecDeque, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    LockError,
    core::{Bitmap, Block, BlockCatalog},
};

use super::{
    command::{Command, DiscardReason, LockOutcome, TurnReport},
    snapshot::GameSnapshot,
    spawn::{BlockSpawner, BoardSeed},
};

/// Number of upcoming blocks visible in the preview queue.
pub const PREVIEW_LEN: usize = 5;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::IsVariant,
)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    #[display("playing")]
    Playing,
    #[display("failed")]
    Failed,
}

/// A single game: bitmap, current/held/preview blocks, score and status.
///
/// The board is advanced one turn at a time with [`Board::send_commands`]. A game
/// ends, irreversibly, when a newly dequeued block has no legal position.
///
/// # Example
///
/// ```
/// use dropblox_engine::{Board, BoardSeed, Command};
///
/// let mut board = Board::new(BoardSeed::new(7));
/// let report = board.send_commands([Command::Left, Command::Left, Command::Rotate]);
/// assert!(report.applied);
/// assert!(report.lock.is_some());
/// assert!(board.state().is_playing());
/// ```
#[derive(Debug, Clone)]
pub struct Board {
    bitmap: Bitmap,
    block: Block,
    held_block: Block,
    preview: VecDeque<Block>,
    score: u64,
    state: GameState,
    spawner: BlockSpawner,
}

impl Board {
    /// Creates an empty board using the standard block catalog.
    #[must_use]
    pub fn new(seed: BoardSeed) -> Self {
        Self::with_catalog(seed, BlockCatalog::standard())
    }

    #[must_use]
    pub fn with_catalog(seed: BoardSeed, catalog: Arc<BlockCatalog>) -> Self {
        Self::with_bitmap(seed, catalog, Bitmap::EMPTY)
    }

    /// Creates a board with pre-filled cells.
    ///
    /// Blocks are drawn in a fixed order: current, held, then the preview queue. If
    /// the first block already collides the board starts out failed.
    #[must_use]
    pub fn with_bitmap(seed: BoardSeed, catalog: Arc<BlockCatalog>, bitmap: Bitmap) -> Self {
        let mut spawner = BlockSpawner::new(seed, catalog);
        let block = spawner.spawn(0);
        let held_block = spawner.spawn(0);
        let preview = (0..PREVIEW_LEN).map(|_| spawner.spawn(0)).collect();
        let state = if bitmap.rows_free(&block) < 0 {
            GameState::Failed
        } else {
            GameState::Playing
        };
        Self {
            bitmap,
            block,
            held_block,
            preview,
            score: 0,
            state,
            spawner,
        }
    }

    #[must_use]
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    #[must_use]
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// The held block. Holding is reserved; this block never enters play.
    #[must_use]
    pub fn held_block(&self) -> &Block {
        &self.held_block
    }

    pub fn preview(&self) -> impl Iterator<Item = &Block> + '_ {
        self.preview.iter()
    }

    #[must_use]
    pub fn score(&self) -> u64 {
        self.score
    }

    #[must_use]
    pub fn state(&self) -> GameState {
        self.state
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<BlockCatalog> {
        self.spawner.catalog()
    }

    /// Returns `true` if every cell of `block` is on the board and unoccupied.
    #[must_use]
    pub fn check(&self, block: &Block) -> bool {
        self.bitmap.check(block)
    }

    /// Number of rows `block` can fall; negative if its position is already illegal.
    #[must_use]
    pub fn rows_free(&self, block: &Block) -> i32 {
        self.bitmap.rows_free(block)
    }

    /// Applies a movement command to `block` and returns the result if it is legal.
    ///
    /// Returns `None` for illegal results and for `hold`/`drop`, which are not
    /// movements.
    #[must_use]
    pub fn candidate(&self, block: &Block, command: Command) -> Option<Block> {
        let moved = match command {
            Command::Rotate => block.rotated(),
            Command::Left => block.left(),
            Command::Right => block.right(),
            Command::Up => block.up(),
            Command::Down => block.down(),
            Command::Hold | Command::Drop => return None,
        };
        self.check(&moved).then_some(moved)
    }

    /// Drops `block` to its lowest legal row, locks it and clears full rows.
    ///
    /// Clearing `n` rows adds `2^n − 1` points to the score.
    pub fn lock_and_clear(&mut self, block: &Block) -> Result<LockOutcome, LockError> {
        let rows_free = self.rows_free(block);
        if rows_free < 0 {
            return Err(LockError);
        }
        self.bitmap.fill_block_shifted(block, rows_free);
        let outcome = LockOutcome::from_rows_cleared(self.bitmap.clear_rows());
        self.score = self.score.saturating_add(outcome.delta_score);
        Ok(outcome)
    }

    /// Plays one turn.
    ///
    /// Commands are applied in order and a `drop` is always appended. Illegal moves,
    /// `hold`, and anything after the first `drop` are discarded and listed in the
    /// returned report. If the game is over the turn is ignored.
    pub fn send_commands<I>(&mut self, commands: I) -> TurnReport
    where
        I: IntoIterator<Item = Command>,
    {
        if self.state.is_failed() {
            return TurnReport::ignored();
        }

        let mut report = TurnReport {
            applied: true,
            ..TurnReport::default()
        };
        for (index, command) in commands.into_iter().enumerate() {
            if report.lock.is_some() {
                report.discard(index, command, DiscardReason::AfterDrop);
                continue;
            }
            match command {
                Command::Hold => report.discard(index, command, DiscardReason::HoldDisabled),
                Command::Drop => report.lock = Some(self.place()),
                _ => match self.candidate(&self.block, command) {
                    Some(block) => self.block = block,
                    None => report.discard(index, command, DiscardReason::Collision),
                },
            }
        }
        // Every turn ends with a drop.
        if report.lock.is_none() {
            report.lock = Some(self.place());
        }
        report
    }

    fn place(&mut self) -> LockOutcome {
        let block = self.block.clone();
        let Ok(outcome) = self.lock_and_clear(&block) else {
            // The current block is legal while playing, so this is unreachable in
            // practice; treat it as a top-out.
            self.state = GameState::Failed;
            return LockOutcome::default();
        };

        self.block = self
            .preview
            .pop_front()
            .unwrap_or_else(|| self.spawner.spawn(self.score));
        let next = self.spawner.spawn(self.score);
        self.preview.push_back(next);
        if self.rows_free(&self.block) < 0 {
            self.state = GameState::Failed;
        }
        outcome
    }

    #[must_use]
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            state: self.state,
            bitmap: self.bitmap.clone(),
            block: self.block.clone(),
            held_block: self.held_block.clone(),
            preview: self.preview.iter().cloned().collect(),
            score: self.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{COLS, Point, ROWS};

    fn monomino_catalog() -> Arc<BlockCatalog> {
        Arc::new(BlockCatalog::new(&[&[&[(0, 0)]]]).unwrap())
    }

    fn column_count(board: &Board, col: usize) -> usize {
        board.bitmap().rows().iter().filter(|row| row[col] != 0).count()
    }

    #[test]
    fn test_new_board() {
        let board = Board::new(BoardSeed::new(1));
        assert!(board.state().is_playing());
        assert_eq!(board.score(), 0);
        assert_eq!(board.preview().count(), PREVIEW_LEN);
        assert_eq!(board.bitmap(), &Bitmap::EMPTY);
        assert!(board.check(board.block()));
    }

    #[test]
    fn test_candidate_rejects_walls() {
        let board = Board::with_catalog(BoardSeed::new(1), monomino_catalog());
        let mut block = board.block().clone();
        for _ in 0..6 {
            block = board.candidate(&block, Command::Left).unwrap();
        }
        assert_eq!(block.center().col, 0);
        assert_eq!(board.candidate(&block, Command::Left), None);
        assert_eq!(board.candidate(&block, Command::Hold), None);
        assert_eq!(board.candidate(&block, Command::Drop), None);
    }

    #[test]
    fn test_illegal_moves_are_discarded() {
        let mut board = Board::with_catalog(BoardSeed::new(1), monomino_catalog());
        let commands = std::iter::repeat_n(Command::Left, 8).chain([Command::Hold]);
        let report = board.send_commands(commands);

        assert!(report.applied);
        let collisions: Vec<_> = report
            .discarded
            .iter()
            .filter(|d| d.reason == DiscardReason::Collision)
            .map(|d| d.index)
            .collect();
        assert_eq!(collisions, vec![6, 7]);
        assert!(
            report
                .discarded
                .iter()
                .any(|d| d.index == 8 && d.reason == DiscardReason::HoldDisabled)
        );
        assert_eq!(board.bitmap().rows()[ROWS - 1][0], 1);
    }

    #[test]
    fn test_commands_after_drop_are_discarded() {
        let mut board = Board::with_catalog(BoardSeed::new(1), monomino_catalog());
        let report = board.send_commands([Command::Drop, Command::Left, Command::Drop]);
        assert_eq!(
            report.discarded,
            vec![
                crate::DiscardedCommand {
                    index: 1,
                    command: Command::Left,
                    reason: DiscardReason::AfterDrop,
                },
                crate::DiscardedCommand {
                    index: 2,
                    command: Command::Drop,
                    reason: DiscardReason::AfterDrop,
                },
            ]
        );
        // Only one block was locked, in the spawn column.
        assert_eq!(column_count(&board, 6), 1);
        assert_eq!(column_count(&board, 5), 0);
    }

    #[test]
    fn test_single_column_never_clears() {
        let mut board = Board::with_catalog(BoardSeed::new(11), monomino_catalog());
        let mut turns_applied = 0;
        for _ in 0..ROWS {
            if board.send_commands([Command::Drop]).applied {
                turns_applied += 1;
            }
        }

        assert_eq!(board.score(), 0);
        assert!(board.state().is_failed());
        // Rows 9..=32 fill up; the next spawn at row 9 collides.
        assert_eq!(turns_applied, 24);
        assert_eq!(column_count(&board, 6), 24);
        for col in (0..COLS).filter(|&c| c != 6) {
            assert_eq!(column_count(&board, col), 0);
        }
    }

    #[test]
    fn test_failed_is_absorbing() {
        let mut board = Board::with_catalog(BoardSeed::new(11), monomino_catalog());
        while board.state().is_playing() {
            board.send_commands([]);
        }
        let before = board.snapshot();
        let report = board.send_commands([Command::Left, Command::Drop]);
        assert!(!report.applied);
        assert_eq!(report.lock, None);
        assert_eq!(board.snapshot(), before);
    }

    #[test]
    fn test_game_over_exactly_when_spawn_collides() {
        let mut board = Board::with_catalog(BoardSeed::new(5), monomino_catalog());
        loop {
            let report = board.send_commands([]);
            assert!(report.applied);
            let blocked = board.rows_free(board.block()) < 0;
            assert_eq!(board.state().is_failed(), blocked);
            if blocked {
                break;
            }
        }
    }

    #[test]
    fn test_filling_last_cell_clears_row() {
        let mut bitmap = Bitmap::EMPTY;
        for col in 0..12 {
            if col != 6 {
                bitmap.fill_cell(Point::new(32, col), 2).unwrap();
            }
        }
        bitmap.fill_cell(Point::new(31, 0), 3).unwrap();
        let mut board = Board::with_bitmap(BoardSeed::new(1), monomino_catalog(), bitmap);

        let report = board.send_commands([Command::Drop]);

        assert_eq!(
            report.lock,
            Some(LockOutcome {
                rows_cleared: 1,
                delta_score: 1,
            })
        );
        assert_eq!(board.score(), 1);
        let rows = board.bitmap().rows();
        assert_eq!(rows.len(), ROWS);
        assert_eq!(rows[0], [0; COLS]);
        // The marker above the cleared row moved down into it.
        assert_eq!(rows[32][0], 3);
        assert_eq!(rows[32].iter().filter(|&&c| c != 0).count(), 1);
    }

    #[test]
    fn test_multi_row_clear_score() {
        let mut bitmap = Bitmap::EMPTY;
        for row in 29..33 {
            for col in 0..12 {
                if col != 6 {
                    bitmap.fill_cell(Point::new(row, col), 1).unwrap();
                }
            }
        }
        let column = [(0, 0), (1, 0), (2, 0), (3, 0)];
        let catalog = Arc::new(BlockCatalog::new(&[&[&column]]).unwrap());
        let mut board = Board::with_bitmap(BoardSeed::new(1), catalog, bitmap);

        let report = board.send_commands([]);

        assert_eq!(report.lock.unwrap().rows_cleared, 4);
        assert_eq!(board.score(), 15);
        assert_eq!(board.bitmap(), &Bitmap::EMPTY);
    }

    #[test]
    fn test_lock_rejects_illegal_block() {
        let mut board = Board::new(BoardSeed::new(1));
        let outside = board.block().translated(-20, 0);
        assert!(board.lock_and_clear(&outside).is_err());
        assert_eq!(board.bitmap(), &Bitmap::EMPTY);
        assert_eq!(board.score(), 0);
    }

    #[test]
    fn test_same_seed_same_game() {
        let scripts: [&[Command]; 4] = [
            &[Command::Left, Command::Left, Command::Left],
            &[Command::Rotate, Command::Right, Command::Right, Command::Right],
            &[Command::Down, Command::Rotate, Command::Up],
            &[Command::Right; 5],
        ];
        let mut a = Board::new(BoardSeed::new(1234));
        let mut b = Board::new(BoardSeed::new(1234));
        for turn in 0..200 {
            let script = scripts[turn % scripts.len()];
            let ra = a.send_commands(script.iter().copied());
            let rb = b.send_commands(script.iter().copied());
            assert_eq!(ra, rb);
            assert_eq!(a.snapshot(), b.snapshot());
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = Board::new(BoardSeed::new(1));
        let b = Board::new(BoardSeed::new(2));
        let kinds = |board: &Board| {
            std::iter::once(board.block())
                .chain(board.preview())
                .map(Block::kind)
                .collect::<Vec<_>>()
        };
        assert_ne!(kinds(&a), kinds(&b));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let board = Board::new(BoardSeed::new(3));
        let json = serde_json::to_value(board.snapshot()).unwrap();
        assert_eq!(json["state"], "playing");
        assert_eq!(json["score"], 0);
        assert_eq!(json["bitmap"].as_array().unwrap().len(), ROWS);
        assert_eq!(json["preview"].as_array().unwrap().len(), PREVIEW_LEN);
        assert!(json["block"]["center"]["row"].is_i64());
        assert!(json["held_block"]["offsets"].is_array());
        assert!(json["block"]["type"].is_u64());
    }
}
