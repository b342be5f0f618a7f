//! WASM bindings for madn-core
//!
//! Lets the browser preview legal moves and captures without a round trip.
//! Piece sets cross the boundary as plain integer arrays; colors as their
//! lowercase names.

use wasm_bindgen::prelude::*;

use crate::{Board, Color, PieceSet, Position, RuleSet};

fn parse_color(color: &str) -> Result<Color, JsValue> {
    color.parse().map_err(|e: crate::Error| JsValue::from_str(&e.to_string()))
}

fn parse_pieces(values: &[i8]) -> Result<PieceSet, JsValue> {
    let values: Vec<i64> = values.iter().map(|&v| v as i64).collect();
    PieceSet::from_values(&values).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_position(value: i8) -> Result<Position, JsValue> {
    Position::new(value).ok_or_else(|| JsValue::from_str(&crate::Error::InvalidPosition(value as i64).to_string()))
}

/// WASM-friendly board snapshot with the stacking-aware rules.
#[wasm_bindgen]
pub struct WasmBoard {
    inner: Board,
    rules: RuleSet,
}

#[wasm_bindgen]
impl WasmBoard {
    /// Create an empty board
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmBoard {
        WasmBoard {
            inner: Board::new(),
            rules: RuleSet::default(),
        }
    }

    /// Switch to the simple capture rules
    #[wasm_bindgen(js_name = useSimpleRules)]
    pub fn use_simple_rules(&mut self) {
        self.rules = RuleSet::SIMPLE;
    }

    /// Seat a color with its four piece positions
    #[wasm_bindgen(js_name = setPieces)]
    pub fn set_pieces(&mut self, color: &str, pieces: &[i8]) -> Result<(), JsValue> {
        let color = parse_color(color)?;
        self.inner.set(color, parse_pieces(pieces)?);
        Ok(())
    }

    /// Legal moves for a seated color as JSON:
    /// [{ piece_index, from_position, to_position }, ...]
    #[wasm_bindgen(js_name = validMoves)]
    pub fn valid_moves(&self, color: &str, dice: u8) -> Result<JsValue, JsValue> {
        let color = parse_color(color)?;
        let dice = crate::check_die(dice as i64).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let pieces = self.inner.get(color).copied().unwrap_or_default();
        let moves = crate::enumerate_moves(&pieces, dice, color, Some(&self.inner), self.rules);
        serde_wasm_bindgen::to_value(&moves).map_err(JsValue::from)
    }

    /// Destination of one piece, or -1 if it cannot move
    #[wasm_bindgen(js_name = canMove)]
    pub fn can_move(&self, color: &str, piece_index: usize, dice: u8) -> Result<i8, JsValue> {
        let color = parse_color(color)?;
        let dice = crate::check_die(dice as i64).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let pieces = self.inner.get(color).copied().unwrap_or_default();
        let piece = pieces
            .get(piece_index)
            .ok_or_else(|| JsValue::from_str(&crate::Error::InvalidPieceIndex(piece_index as i64).to_string()))?;
        Ok(crate::can_move(piece, dice, color, &pieces, Some(&self.inner), self.rules)
            .map_or(crate::HOME, Position::value))
    }

    /// Victim of landing on `destination` as JSON { color, piece_index }, or null
    #[wasm_bindgen(js_name = resolveCapture)]
    pub fn resolve_capture(&self, color: &str, destination: i8) -> Result<JsValue, JsValue> {
        let color = parse_color(color)?;
        let destination = parse_position(destination)?;
        let capture = crate::resolve_capture(destination, color, &self.inner, self.rules);
        serde_wasm_bindgen::to_value(&capture).map_err(JsValue::from)
    }

    /// Whether a seated color has all four pieces in its finish lane
    #[wasm_bindgen(js_name = hasWon)]
    pub fn has_won(&self, color: &str) -> Result<bool, JsValue> {
        let color = parse_color(color)?;
        Ok(self.inner.get(color).is_some_and(crate::has_won))
    }
}

impl Default for WasmBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute ring cell of a relative position
#[wasm_bindgen(js_name = toAbsolute)]
pub fn to_absolute(relative: i8, color: &str) -> Result<i8, JsValue> {
    Ok(crate::to_absolute(relative, parse_color(color)?))
}

/// Relative position of an absolute ring cell
#[wasm_bindgen(js_name = toRelative)]
pub fn to_relative(absolute: i8, color: &str) -> Result<i8, JsValue> {
    Ok(crate::to_relative(absolute, parse_color(color)?))
}
