//! The six-sided die.
//!
//! The engine never owns a random source; callers hand one in, so every
//! rule stays deterministic under test.

use rand::Rng;

use crate::{Error, PIECES};

/// Number of faces on the die.
pub const DIE_FACES: u8 = 6;
/// Roll needed to bring a piece out of home.
pub const ENTRY_ROLL: u8 = 6;

/// Roll a uniform value in `1..=6` from the supplied source.
#[inline]
pub fn roll_die<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.random_range(1..=DIE_FACES)
}

/// Validate a die value coming from outside the engine.
pub fn check_die(value: i64) -> Result<u8, Error> {
    if (1..=DIE_FACES as i64).contains(&value) {
        Ok(value as u8)
    } else {
        Err(Error::InvalidDie(value))
    }
}

/// Validate a piece index coming from outside the engine.
pub fn check_piece_index(value: i64) -> Result<usize, Error> {
    if (0..PIECES as i64).contains(&value) {
        Ok(value as usize)
    } else {
        Err(Error::InvalidPieceIndex(value))
    }
}
