use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A single move token of a turn.
///
/// Tokens use their lowercase names on the wire (`rotate`, `left`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Rotate,
    Left,
    Right,
    Up,
    Down,
    /// Reserved. Accepted as a token but never changes the board.
    Hold,
    Drop,
}

impl Command {
    pub const ALL: [Self; 7] = [
        Self::Rotate,
        Self::Left,
        Self::Right,
        Self::Up,
        Self::Down,
        Self::Hold,
        Self::Drop,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rotate => "rotate",
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
            Self::Hold => "hold",
            Self::Drop => "drop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unknown move token: {token:?}")]
pub struct ParseCommandError {
    token: String,
}

impl ParseCommandError {
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseCommandError {
                token: s.to_owned(),
            })
    }
}

/// Outcome of locking a block into the bitmap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOutcome {
    pub rows_cleared: usize,
    pub delta_score: u64,
}

impl LockOutcome {
    /// Scoring rule: clearing `n` rows at once awards `2^n − 1` points.
    #[must_use]
    pub fn from_rows_cleared(rows_cleared: usize) -> Self {
        let delta_score = u32::try_from(rows_cleared)
            .ok()
            .and_then(|n| 1u64.checked_shl(n))
            .map_or(u64::MAX, |v| v - 1);
        Self {
            rows_cleared,
            delta_score,
        }
    }
}

/// Why a command of a turn had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// The moved or rotated block would leave the grid or overlap locked cells.
    #[display("collision")]
    Collision,
    /// `hold` is reserved and currently disabled.
    #[display("hold disabled")]
    HoldDisabled,
    /// The command came after the turn's drop.
    #[display("after drop")]
    AfterDrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardedCommand {
    pub index: usize,
    pub command: Command,
    pub reason: DiscardReason,
}

/// Diagnostics for one call of [`Board::send_commands`](crate::Board::send_commands).
///
/// Discarded commands are reported here only; the board never treats them as errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnReport {
    /// `false` when the game was already over and the whole turn was ignored.
    pub applied: bool,
    pub discarded: Vec<DiscardedCommand>,
    pub lock: Option<LockOutcome>,
}

impl TurnReport {
    pub(crate) fn ignored() -> Self {
        Self::default()
    }

    pub(crate) fn discard(&mut self, index: usize, command: Command, reason: DiscardReason) {
        self.discarded.push(DiscardedCommand {
            index,
            command,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        for command in Command::ALL {
            assert_eq!(command.as_str().parse::<Command>().unwrap(), command);
            assert_eq!(command.to_string(), command.as_str());
        }
    }

    #[test]
    fn test_parse_rejects_unknown_tokens() {
        for token in ["", "Rotate", "LEFT", " drop", "spin", "drop\n"] {
            let err = token.parse::<Command>().unwrap_err();
            assert_eq!(err.token(), token);
        }
    }

    #[test]
    fn test_score_formula() {
        assert_eq!(LockOutcome::from_rows_cleared(0).delta_score, 0);
        assert_eq!(LockOutcome::from_rows_cleared(1).delta_score, 1);
        assert_eq!(LockOutcome::from_rows_cleared(2).delta_score, 3);
        assert_eq!(LockOutcome::from_rows_cleared(4).delta_score, 15);
        assert_eq!(LockOutcome::from_rows_cleared(10).delta_score, 1023);
    }
}
