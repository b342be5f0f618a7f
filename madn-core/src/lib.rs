//! "Man, Don't Get Angry" rules engine.
//!
//! Pure functions over explicit inputs: the engine holds no state between
//! calls. Callers pass the mover's color, the die value and borrowed piece
//! snapshots, and get back plain decisions (destination, capture victim,
//! win flag) to apply themselves.
//!
//! # Board Layout
//!
//! ```text
//! Shared ring: 40 cells, absolute numbering 0-39.
//!
//!   Color   start offset   finish entry
//!   Red           0             39
//!   Blue         10              9
//!   Green        20             19
//!   Yellow       30             29
//!
//! Piece position, relative to its owner's color:
//!   -1       at home (off the board)
//!   0-39     on the ring, 0 = owner's start cell
//!   40-45    owner's private finish lane, 45 = center
//! ```
//!
//! Relative ring positions convert to absolute ones with
//! `(relative + start_offset) mod 40`. Finish lane positions are never
//! converted: each lane belongs to a single color.

#[cfg(feature = "wasm")]
pub mod wasm;

mod dice;
mod error;
mod rules;

pub use dice::{check_die, check_piece_index, roll_die, DIE_FACES, ENTRY_ROLL};
pub use error::Error;
pub use rules::{can_move, enumerate_moves, fortified_by, has_won, resolve_capture, RuleSet};

use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of cells on the shared ring.
pub const TRACK_LEN: i8 = 40;
/// Number of cells in each finish lane.
pub const LANE_LEN: i8 = 6;
/// First finish lane cell (relative).
pub const LANE_START: i8 = TRACK_LEN;
/// Last finish lane cell, the center.
pub const LANE_END: i8 = LANE_START + LANE_LEN - 1;
/// Position value of a piece at home.
pub const HOME: i8 = -1;
/// Pieces per player.
pub const PIECES: usize = 4;

// ============================================================================
// COLORS
// ============================================================================

/// Player color. Each color owns a fixed start cell and finish lane.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Color {
    Red = 0,
    Blue = 1,
    Green = 2,
    Yellow = 3,
}

impl Color {
    /// All colors in seating order.
    pub const ALL: [Color; 4] = [Color::Red, Color::Blue, Color::Green, Color::Yellow];

    /// Index into color-keyed arrays (0-3).
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Convert from index (0-3) to Color.
    #[inline]
    pub fn from_index(idx: usize) -> Option<Color> {
        Self::ALL.get(idx).copied()
    }

    /// Absolute ring cell where this color's relative position 0 lies.
    #[inline]
    pub const fn start_offset(self) -> i8 {
        self as i8 * 10
    }

    /// Absolute ring cell from which this color turns into its finish lane.
    #[inline]
    pub const fn finish_entry(self) -> i8 {
        (self.start_offset() - 1).rem_euclid(TRACK_LEN)
    }

    /// Lowercase name, as used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Blue => "blue",
            Color::Green => "green",
            Color::Yellow => "yellow",
        }
    }

    /// Iterate over all colors.
    pub fn all() -> impl Iterator<Item = Color> {
        Self::ALL.into_iter()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Color, Error> {
        Color::all()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownColor(s.to_string()))
    }
}

// ============================================================================
// COORDINATE MAPPING
// ============================================================================

/// Convert a color-relative position to an absolute ring cell.
///
/// Home maps to `-1`. Finish lane values are returned unchanged since lanes
/// are private to their color and never comparable across colors.
#[inline]
pub const fn to_absolute(relative: i8, color: Color) -> i8 {
    if relative < 0 {
        return HOME;
    }
    if relative >= TRACK_LEN {
        return relative;
    }
    (relative + color.start_offset()).rem_euclid(TRACK_LEN)
}

/// Inverse of [`to_absolute`] on the ring. Home and finish lane values pass
/// through unchanged.
#[inline]
pub const fn to_relative(absolute: i8, color: Color) -> i8 {
    if absolute < 0 {
        return HOME;
    }
    if absolute >= TRACK_LEN {
        return absolute;
    }
    (absolute - color.start_offset()).rem_euclid(TRACK_LEN)
}

// ============================================================================
// POSITIONS
// ============================================================================

/// Which part of the board a position lies on.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Zone {
    Home,
    Ring,
    Lane,
}

/// Position of one piece, relative to its owner's color.
///
/// Always one of `-1` (home), `0..=39` (ring) or `40..=45` (finish lane).
/// The checked constructors are the only way to build one from outside the
/// crate, so an out-of-range value cannot reach the rules.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Position(i8);

impl Position {
    /// A piece waiting at home.
    pub const HOME: Position = Position(HOME);
    /// The owner's start cell.
    pub const START: Position = Position(0);
    /// The last finish lane cell.
    pub const CENTER: Position = Position(LANE_END);

    /// Create a position, or None if the value is outside every zone.
    #[inline]
    pub const fn new(value: i8) -> Option<Position> {
        if value >= HOME && value <= LANE_END {
            Some(Position(value))
        } else {
            None
        }
    }

    /// Raw relative value.
    #[inline]
    pub const fn value(self) -> i8 {
        self.0
    }

    #[inline]
    pub const fn zone(self) -> Zone {
        if self.0 < 0 {
            Zone::Home
        } else if self.0 < TRACK_LEN {
            Zone::Ring
        } else {
            Zone::Lane
        }
    }

    #[inline]
    pub const fn is_home(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn is_on_ring(self) -> bool {
        self.0 >= 0 && self.0 < TRACK_LEN
    }

    #[inline]
    pub const fn is_in_lane(self) -> bool {
        self.0 >= LANE_START
    }

    /// Absolute ring cell for a piece of the given color (see [`to_absolute`]).
    #[inline]
    pub const fn to_absolute(self, color: Color) -> i8 {
        to_absolute(self.0, color)
    }

    /// Position of a color whose piece sits on the given absolute ring cell.
    #[inline]
    pub fn from_absolute(absolute: i8, color: Color) -> Option<Position> {
        Position::new(to_relative(absolute, color))
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.zone() {
            Zone::Home => write!(f, "Home"),
            Zone::Ring => write!(f, "Ring({})", self.0),
            Zone::Lane => write!(f, "Lane({})", self.0),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Position {
    type Error = Error;

    fn try_from(value: i64) -> Result<Position, Error> {
        i8::try_from(value)
            .ok()
            .and_then(Position::new)
            .ok_or(Error::InvalidPosition(value))
    }
}

impl From<Position> for i64 {
    fn from(pos: Position) -> i64 {
        pos.0 as i64
    }
}

// ============================================================================
// PIECE SETS
// ============================================================================

/// The four pieces of one color. The index is the piece's identity, not its
/// board order.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceSet(pub [Position; PIECES]);

impl PieceSet {
    /// All four pieces at home.
    pub const AT_HOME: PieceSet = PieceSet([Position::HOME; PIECES]);

    /// Build a piece set from plain integers, validating count and range.
    pub fn from_values(values: &[i64]) -> Result<PieceSet, Error> {
        if values.len() != PIECES {
            return Err(Error::PieceCount {
                expected: PIECES,
                got: values.len(),
            });
        }
        let mut pieces = [Position::HOME; PIECES];
        for (slot, &value) in pieces.iter_mut().zip(values) {
            *slot = Position::try_from(value)?;
        }
        Ok(PieceSet(pieces))
    }

    /// Raw relative values, in piece order.
    pub fn values(&self) -> [i8; PIECES] {
        self.0.map(Position::value)
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<Position> {
        self.0.get(idx).copied()
    }

    /// Check whether any piece stands on the given position.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        self.0.contains(&pos)
    }

    /// Iterate over positions in piece order.
    pub fn iter(&self) -> impl Iterator<Item = Position> + '_ {
        self.0.iter().copied()
    }

    /// Copy of this set with the move applied.
    ///
    /// Does NOT validate; the move should come from [`enumerate_moves`] or
    /// [`can_move`].
    pub fn with_move(mut self, mov: &Move) -> PieceSet {
        debug_assert_eq!(self.0[mov.piece_index], mov.from_position);
        self.0[mov.piece_index] = mov.to_position;
        self
    }

    /// Copy of this set with one piece returned home after a capture.
    pub fn send_home(mut self, piece_index: usize) -> PieceSet {
        self.0[piece_index] = Position::HOME;
        self
    }
}

impl Default for PieceSet {
    fn default() -> Self {
        Self::AT_HOME
    }
}

impl Index<usize> for PieceSet {
    type Output = Position;

    fn index(&self, idx: usize) -> &Position {
        &self.0[idx]
    }
}

// ============================================================================
// BOARD SNAPSHOT
// ============================================================================

/// Read-only snapshot of every seated color's pieces, indexed by color.
///
/// Empty seats are `None`. The rules never mutate a board; callers rebuild
/// one from their own storage for every decision.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Board {
    seats: [Option<PieceSet>; 4],
}

impl Board {
    /// Create an empty board with no seated colors.
    pub fn new() -> Board {
        Board::default()
    }

    /// Builder-style seat assignment.
    pub fn with(mut self, color: Color, pieces: PieceSet) -> Board {
        self.set(color, pieces);
        self
    }

    pub fn set(&mut self, color: Color, pieces: PieceSet) {
        self.seats[color.index()] = Some(pieces);
    }

    /// Pieces of a color, if that color is seated.
    #[inline]
    pub fn get(&self, color: Color) -> Option<&PieceSet> {
        self.seats[color.index()].as_ref()
    }

    /// Iterate over seated colors in seating order.
    pub fn seated(&self) -> impl Iterator<Item = (Color, &PieceSet)> + '_ {
        Color::all().filter_map(move |c| self.get(c).map(|pieces| (c, pieces)))
    }

    /// Iterate over every seated color other than `mover`.
    pub fn opponents(&self, mover: Color) -> impl Iterator<Item = (Color, &PieceSet)> + '_ {
        self.seated().filter(move |(c, _)| *c != mover)
    }

    /// Count the pieces of `color` standing on an absolute ring cell.
    pub fn count_at(&self, absolute: i8, color: Color) -> usize {
        self.get(color).map_or(0, |pieces| {
            pieces
                .iter()
                .filter(|p| p.is_on_ring() && p.to_absolute(color) == absolute)
                .count()
        })
    }
}

// ============================================================================
// MOVES & CAPTURES
// ============================================================================

/// One relocation of one piece, in its owner's relative coordinates.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Move {
    pub piece_index: usize,
    pub from_position: Position,
    pub to_position: Position,
}

/// The opposing piece a move sends home.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Capture {
    pub color: Color,
    pub piece_index: usize,
}
