use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::Color;
use thiserror::Error;

/// Player colour as carried in request and result payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerColor::White => "white",
            PlayerColor::Black => "black",
        }
    }
}

impl From<Color> for PlayerColor {
    fn from(color: Color) -> Self {
        color.fold_wb(PlayerColor::White, PlayerColor::Black)
    }
}

impl From<PlayerColor> for Color {
    fn from(color: PlayerColor) -> Self {
        match color {
            PlayerColor::White => Color::White,
            PlayerColor::Black => Color::Black,
        }
    }
}

impl std::fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown player colour: {0}")]
pub struct ParseColorError(String);

impl FromStr for PlayerColor {
    type Err = ParseColorError;

    /// Accepts `white`/`black` in any case, or `w`/`b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(PlayerColor::White),
            "black" | "b" => Ok(PlayerColor::Black),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}
