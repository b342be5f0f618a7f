//! Errors raised when plain caller data is turned into rules types.
//!
//! Illegal moves are not errors; the rules report them as `None`.

/// Invalid input handed to the engine by a caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid position {0}: expected -1 (home), 0..=39 (ring) or 40..=45 (finish lane)")]
    InvalidPosition(i64),

    #[error("expected {expected} pieces, got {got}")]
    PieceCount { expected: usize, got: usize },

    #[error("unknown color {0:?}")]
    UnknownColor(String),

    #[error("die value {0} out of range 1..=6")]
    InvalidDie(i64),

    #[error("piece index {0} out of range 0..=3")]
    InvalidPieceIndex(i64),
}
