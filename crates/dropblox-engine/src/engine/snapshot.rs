use serde::{Deserialize, Serialize};

use crate::core::{Bitmap, Block};

use super::board::GameState;

/// Serialized game state handed to the move-choosing agent.
///
/// ```json
/// {
///   "state": "playing",
///   "bitmap": [[0, 0, ...], ...],
///   "block": {"type": 3, "center": {"row": 8, "col": 6}, "offsets": [...]},
///   "held_block": {...},
///   "preview": [{...}, ...],
///   "score": 12
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub state: GameState,
    pub bitmap: Bitmap,
    pub block: Block,
    pub held_block: Block,
    pub preview: Vec<Block>,
    pub score: u64,
}
