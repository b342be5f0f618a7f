//! Move legality, capture resolution, win detection and move enumeration.
//!
//! # Rule Variants
//!
//! ```text
//!                      ring_stacking   stack_protection
//! RuleSet::default()       true             true        (stacking-aware)
//! RuleSet::SIMPLE          false            false       (simple capture)
//! ```
//!
//! `ring_stacking`: own pieces may share a ring cell, including the start
//! cell on entry. Self-stacking inside the finish lane is never allowed.
//!
//! `stack_protection`: two or more pieces of one color on a ring cell form a
//! fortified stack. Nobody else may land on it and it cannot be captured.

use crate::{Board, Capture, Color, Move, PieceSet, Position, ENTRY_ROLL, LANE_END, LANE_START, PIECES};

/// Configurable rule flags. The default is the stacking-aware rule set.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct RuleSet {
    /// Own pieces may share a ring cell.
    pub ring_stacking: bool,
    /// Fortified stacks block landings and are immune to capture.
    pub stack_protection: bool,
}

impl RuleSet {
    /// Stacking-aware rules.
    pub const STACKING: RuleSet = RuleSet {
        ring_stacking: true,
        stack_protection: true,
    };

    /// Earlier rules: no own stacking anywhere, every lone or stacked
    /// opposing piece can be captured.
    pub const SIMPLE: RuleSet = RuleSet {
        ring_stacking: false,
        stack_protection: false,
    };
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::STACKING
    }
}

// ============================================================================
// MOVE LEGALITY
// ============================================================================

/// Check whether a piece may move by `dice` and return its destination.
///
/// `own` is the mover's full piece set, including the piece being checked.
/// `opponents` is only consulted for the blocked-stack rule; pass `None` to
/// skip it. Returns `None` for every illegal move.
///
/// Order of checks:
/// 1. A piece at home leaves only on a 6, onto relative 0.
/// 2. Anything past the center cell (45) is an overshoot.
/// 3. Reaching 40 or more lands on the literal sum inside the finish lane,
///    which must not already hold an own piece.
/// 4. Otherwise the piece moves along the ring, subject to the stacking
///    flags of `rules`.
pub fn can_move(
    piece: Position,
    dice: u8,
    color: Color,
    own: &PieceSet,
    opponents: Option<&Board>,
    rules: RuleSet,
) -> Option<Position> {
    debug_assert!((1..=6).contains(&dice), "die value {} out of range", dice);

    if piece.is_home() {
        if dice != ENTRY_ROLL {
            return None;
        }
        if !rules.ring_stacking && own.contains(Position::START) {
            return None;
        }
        return Some(Position::START);
    }

    let target = piece.value() + dice as i8;
    if target > LANE_END {
        return None;
    }

    if target >= LANE_START {
        let dest = Position(target);
        if own.contains(dest) {
            return None;
        }
        return Some(dest);
    }

    // Sums of 40 and more turned into the lane above, so the ring never wraps
    // for a relative position.
    let dest = Position(target);
    if !rules.ring_stacking && own.contains(dest) {
        return None;
    }
    if rules.stack_protection {
        if let Some(board) = opponents {
            if fortified_by(dest.to_absolute(color), color, board).is_some() {
                return None;
            }
        }
    }
    Some(dest)
}

/// Opposing color holding two or more pieces on an absolute ring cell.
///
/// Single pieces of different colors on the same cell do not fortify it.
pub fn fortified_by(absolute: i8, mover: Color, board: &Board) -> Option<Color> {
    board
        .opponents(mover)
        .map(|(color, _)| color)
        .find(|&color| board.count_at(absolute, color) >= 2)
}

// ============================================================================
// CAPTURES
// ============================================================================

/// Identify the opposing piece sent home by landing on `destination`.
///
/// `destination` is relative to `mover`. Finish lane destinations never
/// capture. Under stack protection a fortified cell yields `None`. When two
/// lone opposing pieces share the cell, only the first in seating order is
/// taken. The board is not modified; the caller sends the victim home.
pub fn resolve_capture(
    destination: Position,
    mover: Color,
    board: &Board,
    rules: RuleSet,
) -> Option<Capture> {
    if !destination.is_on_ring() {
        return None;
    }
    let target = destination.to_absolute(mover);

    if rules.stack_protection && fortified_by(target, mover, board).is_some() {
        return None;
    }

    board.opponents(mover).find_map(|(color, pieces)| {
        pieces
            .iter()
            .position(|p| p.is_on_ring() && p.to_absolute(color) == target)
            .map(|piece_index| Capture { color, piece_index })
    })
}

// ============================================================================
// WIN DETECTION
// ============================================================================

/// A player wins once all four pieces are in the finish lane, at any depth.
#[inline]
pub fn has_won(pieces: &PieceSet) -> bool {
    pieces.iter().all(Position::is_in_lane)
}

// ============================================================================
// MOVE ENUMERATION
// ============================================================================

/// All legal moves for one color under one die value, in piece order.
///
/// An empty list means the player has no move and forfeits the turn.
pub fn enumerate_moves(
    pieces: &PieceSet,
    dice: u8,
    color: Color,
    opponents: Option<&Board>,
    rules: RuleSet,
) -> Vec<Move> {
    let mut moves = Vec::with_capacity(PIECES);
    for (piece_index, from) in pieces.iter().enumerate() {
        if let Some(to) = can_move(from, dice, color, pieces, opponents, rules) {
            moves.push(Move {
                piece_index,
                from_position: from,
                to_position: to,
            });
        }
    }
    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(v: i8) -> Position {
        Position::new(v).unwrap()
    }

    fn set(values: [i64; 4]) -> PieceSet {
        PieceSet::from_values(&values).unwrap()
    }

    fn default_move(piece: i8, dice: u8, own: [i64; 4]) -> Option<Position> {
        can_move(pos(piece), dice, Color::Red, &set(own), None, RuleSet::default())
    }

    #[test]
    fn test_default_rules_are_stacking() {
        assert_eq!(RuleSet::default(), RuleSet::STACKING);
        assert!(RuleSet::default().ring_stacking);
        assert!(RuleSet::default().stack_protection);
    }

    // ========== Home Exit Tests ==========

    #[test]
    fn test_home_needs_six() {
        for dice in 1..=5 {
            assert_eq!(default_move(-1, dice, [-1, -1, -1, -1]), None, "dice {}", dice);
        }
        assert_eq!(default_move(-1, 6, [-1, -1, -1, -1]), Some(Position::START));
    }

    #[test]
    fn test_home_exit_ignores_own_piece_on_start() {
        assert_eq!(default_move(-1, 6, [-1, 0, -1, -1]), Some(Position::START));
    }

    #[test]
    fn test_home_exit_not_blocked_by_fortified_start() {
        // Blue pair on absolute 0 (= Red start cell)
        let board = Board::new().with(Color::Blue, set([30, 30, -1, -1]));
        let dest = can_move(
            Position::HOME,
            6,
            Color::Red,
            &PieceSet::AT_HOME,
            Some(&board),
            RuleSet::default(),
        );
        assert_eq!(dest, Some(Position::START));
    }

    #[test]
    fn test_simple_rules_block_start_with_own_piece() {
        let own = set([-1, 0, -1, -1]);
        let dest = can_move(Position::HOME, 6, Color::Red, &own, None, RuleSet::SIMPLE);
        assert_eq!(dest, None);
    }

    // ========== Finish Lane Tests ==========

    #[test]
    fn test_enter_lane() {
        assert_eq!(default_move(38, 3, [38, -1, -1, -1]), Some(pos(41)));
        assert_eq!(default_move(39, 1, [39, -1, -1, -1]), Some(pos(40)));
        assert_eq!(default_move(34, 6, [34, -1, -1, -1]), Some(pos(40)));
    }

    #[test]
    fn test_enter_lane_blocked_by_own_piece() {
        assert_eq!(default_move(38, 3, [38, 41, -1, -1]), None);
    }

    #[test]
    fn test_advance_inside_lane() {
        assert_eq!(default_move(40, 5, [40, -1, -1, -1]), Some(pos(45)));
        assert_eq!(default_move(41, 2, [41, 43, -1, -1]), None);
    }

    #[test]
    fn test_overshoot() {
        assert_eq!(default_move(44, 3, [44, -1, -1, -1]), None);
        assert_eq!(default_move(45, 1, [45, -1, -1, -1]), None);
        assert_eq!(default_move(39, 6, [39, -1, -1, -1]), Some(pos(45)));
        assert_eq!(default_move(40, 6, [40, -1, -1, -1]), None);
    }

    #[test]
    fn test_lane_ignores_opponents() {
        // Opponents never matter inside the lane, even on the same numbers
        let board = Board::new().with(Color::Blue, set([31, 31, -1, -1]));
        let dest = can_move(
            pos(38),
            3,
            Color::Red,
            &set([38, -1, -1, -1]),
            Some(&board),
            RuleSet::default(),
        );
        assert_eq!(dest, Some(pos(41)));
    }

    // ========== Ring Move Tests ==========

    #[test]
    fn test_ring_move() {
        assert_eq!(default_move(5, 6, [5, -1, -1, -1]), Some(pos(11)));
        assert_eq!(default_move(0, 1, [0, -1, -1, -1]), Some(pos(1)));
    }

    #[test]
    fn test_ring_stacking_allowed_by_default() {
        assert_eq!(default_move(5, 3, [5, 8, -1, -1]), Some(pos(8)));
    }

    #[test]
    fn test_simple_rules_forbid_ring_stacking() {
        let own = set([5, 8, -1, -1]);
        assert_eq!(can_move(pos(5), 3, Color::Red, &own, None, RuleSet::SIMPLE), None);
    }

    #[test]
    fn test_blocked_by_fortified_stack() {
        // Green relative 31 = absolute 11 = Red relative 11
        let board = Board::new().with(Color::Green, set([31, 31, -1, -1]));
        let own = set([5, -1, -1, -1]);
        let dest = can_move(pos(5), 6, Color::Red, &own, Some(&board), RuleSet::default());
        assert_eq!(dest, None);
    }

    #[test]
    fn test_single_pieces_of_two_colors_do_not_block() {
        // Green relative 31 and Yellow relative 21 both sit on absolute 11
        let board = Board::new()
            .with(Color::Green, set([31, -1, -1, -1]))
            .with(Color::Yellow, set([21, -1, -1, -1]));
        let own = set([5, -1, -1, -1]);
        let dest = can_move(pos(5), 6, Color::Red, &own, Some(&board), RuleSet::default());
        assert_eq!(dest, Some(pos(11)));
    }

    #[test]
    fn test_own_pair_does_not_block_self() {
        let board = Board::new().with(Color::Red, set([11, 11, 5, -1]));
        let own = set([11, 11, 5, -1]);
        let dest = can_move(pos(5), 6, Color::Red, &own, Some(&board), RuleSet::default());
        assert_eq!(dest, Some(pos(11)));
    }

    #[test]
    fn test_blocking_skipped_without_opponents_or_protection() {
        let board = Board::new().with(Color::Green, set([31, 31, -1, -1]));
        let own = set([5, -1, -1, -1]);
        assert_eq!(
            can_move(pos(5), 6, Color::Red, &own, None, RuleSet::default()),
            Some(pos(11))
        );
        assert_eq!(
            can_move(pos(5), 6, Color::Red, &own, Some(&board), RuleSet::SIMPLE),
            Some(pos(11))
        );
    }

    // ========== Capture Tests ==========

    #[test]
    fn test_capture_single_piece() {
        // Blue relative 1 = absolute 11
        let blue = set([-1, 1, 44, -1]);
        let board = Board::new().with(Color::Red, set([11, -1, -1, -1])).with(Color::Blue, blue);

        let capture = resolve_capture(pos(11), Color::Red, &board, RuleSet::default());
        assert_eq!(
            capture,
            Some(Capture {
                color: Color::Blue,
                piece_index: 1
            })
        );
        // The resolver leaves the board untouched
        assert_eq!(board.get(Color::Blue), Some(&blue));
    }

    #[test]
    fn test_capture_on_start_cell() {
        // Yellow relative 10 = absolute 0 = Red start
        let board = Board::new().with(Color::Yellow, set([10, -1, -1, -1]));
        let capture = resolve_capture(Position::START, Color::Red, &board, RuleSet::default());
        assert_eq!(
            capture,
            Some(Capture {
                color: Color::Yellow,
                piece_index: 0
            })
        );
    }

    #[test]
    fn test_no_capture_in_lane() {
        // Blue 41 is Blue's lane, not comparable with Red 41
        let board = Board::new().with(Color::Blue, set([41, -1, -1, -1]));
        assert_eq!(resolve_capture(pos(41), Color::Red, &board, RuleSet::default()), None);
        assert_eq!(resolve_capture(pos(41), Color::Red, &board, RuleSet::SIMPLE), None);
    }

    #[test]
    fn test_no_capture_of_own_piece() {
        let board = Board::new().with(Color::Red, set([11, 3, -1, -1]));
        assert_eq!(resolve_capture(pos(11), Color::Red, &board, RuleSet::default()), None);
    }

    #[test]
    fn test_no_capture_on_empty_cell() {
        let board = Board::new()
            .with(Color::Blue, set([2, -1, -1, -1]))
            .with(Color::Green, set([-1, 40, -1, -1]));
        assert_eq!(resolve_capture(pos(20), Color::Red, &board, RuleSet::default()), None);
    }

    #[test]
    fn test_fortified_stack_blocks_and_is_immune() {
        // Blue pair on absolute 15 (Blue relative 5)
        let board = Board::new()
            .with(Color::Red, set([9, -1, -1, -1]))
            .with(Color::Blue, set([5, 5, -1, -1]))
            .with(Color::Green, set([12, -1, -1, -1]));

        // Red 9 + 6 = relative 15 = absolute 15: blocked
        let red = board.get(Color::Red).unwrap();
        assert_eq!(
            can_move(pos(9), 6, Color::Red, red, Some(&board), RuleSet::default()),
            None
        );

        // Green 12 + 3 = relative 15 = absolute 35: not the stack, fine
        let green = board.get(Color::Green).unwrap();
        assert_eq!(
            can_move(pos(12), 3, Color::Green, green, Some(&board), RuleSet::default()),
            Some(pos(15))
        );

        // Green relative 35 = absolute 15: blocked for Green too
        assert_eq!(fortified_by(15, Color::Green, &board), Some(Color::Blue));

        // And no capture even if a destination were forced onto it
        assert_eq!(resolve_capture(pos(15), Color::Red, &board, RuleSet::default()), None);
        assert_eq!(fortified_by(15, Color::Blue, &board), None);
    }

    #[test]
    fn test_simple_rules_capture_stacked_piece() {
        let board = Board::new().with(Color::Blue, set([5, 5, -1, -1]));
        assert_eq!(
            resolve_capture(pos(15), Color::Red, &board, RuleSet::SIMPLE),
            Some(Capture {
                color: Color::Blue,
                piece_index: 0
            })
        );
    }

    #[test]
    fn test_two_lone_opponents_capture_first_in_seating_order() {
        // Green relative 31 and Yellow relative 21 both on absolute 11
        let board = Board::new()
            .with(Color::Yellow, set([21, -1, -1, -1]))
            .with(Color::Green, set([-1, 31, -1, -1]));
        assert_eq!(
            resolve_capture(pos(11), Color::Red, &board, RuleSet::default()),
            Some(Capture {
                color: Color::Green,
                piece_index: 1
            })
        );
    }

    // ========== Win Tests ==========

    #[test]
    fn test_has_won() {
        assert!(has_won(&set([40, 41, 42, 45])));
        assert!(has_won(&set([40, 40, 40, 40])));
        assert!(!has_won(&set([40, 41, 42, 39])));
        assert!(!has_won(&set([45, 44, 43, -1])));
        assert!(!has_won(&PieceSet::AT_HOME));
    }

    // ========== Enumeration Tests ==========

    #[test]
    fn test_enumerate_all_home_without_six() {
        for dice in 1..=5 {
            let moves = enumerate_moves(&PieceSet::AT_HOME, dice, Color::Blue, None, RuleSet::default());
            assert!(moves.is_empty(), "dice {}", dice);
        }
    }

    #[test]
    fn test_enumerate_all_home_with_six() {
        let moves = enumerate_moves(&PieceSet::AT_HOME, 6, Color::Blue, None, RuleSet::default());
        assert_eq!(moves.len(), 4);
        for (i, mov) in moves.iter().enumerate() {
            assert_eq!(mov.piece_index, i);
            assert_eq!(mov.from_position, Position::HOME);
            assert_eq!(mov.to_position, Position::START);
        }
    }

    #[test]
    fn test_enumerate_scenario_open_board() {
        let red = set([-1, 5, 40, 42]);
        let moves = enumerate_moves(&red, 6, Color::Red, None, RuleSet::default());
        assert_eq!(
            moves,
            vec![
                Move {
                    piece_index: 0,
                    from_position: Position::HOME,
                    to_position: pos(0)
                },
                Move {
                    piece_index: 1,
                    from_position: pos(5),
                    to_position: pos(11)
                },
            ]
        );
    }

    #[test]
    fn test_enumerate_scenario_blocked_ring() {
        let red = set([-1, 5, 40, 42]);
        // Blue pair on absolute 11 (Blue relative 1)
        let board = Board::new().with(Color::Red, red).with(Color::Blue, set([1, 1, -1, -1]));
        let moves = enumerate_moves(&red, 6, Color::Red, Some(&board), RuleSet::default());
        let indices: Vec<usize> = moves.iter().map(|m| m.piece_index).collect();
        assert_eq!(indices, vec![0]);
    }

    #[test]
    fn test_enumerate_matches_can_move() {
        let red = set([3, 38, 41, -1]);
        let board = Board::new()
            .with(Color::Red, red)
            .with(Color::Green, set([27, 27, 10, -1]));
        for dice in 1..=6 {
            let moves = enumerate_moves(&red, dice, Color::Red, Some(&board), RuleSet::default());
            for mov in &moves {
                let dest = can_move(mov.from_position, dice, Color::Red, &red, Some(&board), RuleSet::default());
                assert_eq!(dest, Some(mov.to_position));
            }
            let expected = red
                .iter()
                .filter(|p| can_move(*p, dice, Color::Red, &red, Some(&board), RuleSet::default()).is_some())
                .count();
            assert_eq!(moves.len(), expected);
        }
    }
}
