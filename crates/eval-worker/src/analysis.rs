//! Score normalization and move judgments. Pure functions only.
//! (No Engine/Queue/Database dependencies)

use shakmaty::Color;

use crate::session::SearchInfo;

/// Centipawn scores are clipped to +-this before normalizing
pub const CP_CLIP: i32 = 1000;

/// Normalized magnitude every mate score is at least
const MATE_FLOOR: f64 = 0.8;

/// Share of the normalized range that separates short mates from long ones
const MATE_RANGE: f64 = 0.2;

/// Centipawn stand-in for "mate now"; longer mates sit just below it
pub const MATE_SCORE_CP: i32 = 10000;

/// Centipawns given up per ply of mate distance
const MATE_PLY_STEP: i32 = 10;

/// Swing above which a move is a blunder
pub const BLUNDER_THRESHOLD_CP: u32 = 100;

const PERFECT_ACCURACY: f64 = 100.0;

/// An engine score as reported, relative to one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawScore {
    /// Material/positional advantage, 100 = one pawn
    Centipawns(i32),
    /// Forced mate in N plies; positive when the side this score is
    /// relative to delivers it. `Mate(0)` means that side is already mated.
    Mate(i32),
}

impl RawScore {
    pub fn is_mate(self) -> bool {
        matches!(self, RawScore::Mate(_))
    }

    pub fn centipawns(self) -> Option<i32> {
        match self {
            RawScore::Centipawns(cp) => Some(cp),
            RawScore::Mate(_) => None,
        }
    }

    pub fn mate_in(self) -> Option<i32> {
        match self {
            RawScore::Centipawns(_) => None,
            RawScore::Mate(n) => Some(n),
        }
    }

    /// The same score seen from the other side.
    ///
    /// `Mate(0)` carries no sign and maps to itself; take [`to_centipawns`]
    /// or [`normalize`] before flipping when the winner matters.
    ///
    /// [`to_centipawns`]: RawScore::to_centipawns
    pub fn flipped(self) -> Self {
        match self {
            RawScore::Centipawns(cp) => RawScore::Centipawns(cp.saturating_neg()),
            RawScore::Mate(n) => RawScore::Mate(n.saturating_neg()),
        }
    }

    /// Re-express a score relative to `pov` as relative to `perspective`.
    pub fn relative_to(self, pov: Color, perspective: Color) -> Self {
        if pov == perspective {
            self
        } else {
            self.flipped()
        }
    }

    /// Put mate and centipawn scores on one ordered axis.
    ///
    /// Mates map to `+-(MATE_SCORE_CP - plies * 10)`, so every mate outranks
    /// any realistic centipawn score and shorter mates outrank longer ones.
    pub fn to_centipawns(self) -> i32 {
        match self {
            RawScore::Centipawns(cp) => cp,
            RawScore::Mate(n) if n > 0 => MATE_SCORE_CP - n.saturating_mul(MATE_PLY_STEP),
            RawScore::Mate(n) => -MATE_SCORE_CP - n.saturating_mul(MATE_PLY_STEP),
        }
    }
}

/// A score in [-1, 1] together with the side it is relative to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedScore {
    pub value: f64,
    pub perspective: Color,
}

impl NormalizedScore {
    /// The value as seen by `side`.
    pub fn for_side(self, side: Color) -> f64 {
        if side == self.perspective {
            self.value
        } else {
            -self.value
        }
    }

    pub fn relative_to(self, side: Color) -> Self {
        Self {
            value: self.for_side(side),
            perspective: side,
        }
    }
}

/// Map a raw score relative to `perspective` into [-1, 1].
///
/// Centipawns are clipped to +-1000 and scaled linearly. Mates land in
/// [0.8, 1.0] by magnitude: mate in 1 is 1.0 and longer mates approach 0.8.
/// A clipped centipawn score can reach 1.0 and therefore tie a long mate.
pub fn normalize(raw: RawScore, perspective: Color) -> NormalizedScore {
    let value = match raw {
        RawScore::Centipawns(cp) => f64::from(cp.clamp(-CP_CLIP, CP_CLIP)) / f64::from(CP_CLIP),
        RawScore::Mate(0) => -1.0,
        RawScore::Mate(n) => {
            let magnitude = MATE_FLOOR + MATE_RANGE * (1.0 / f64::from(n.unsigned_abs()));
            if n > 0 {
                magnitude
            } else {
                -magnitude
            }
        }
    };

    NormalizedScore { value, perspective }
}

/// One analysis, expressed from the judged player's perspective.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub raw_score: RawScore,
    pub normalized: NormalizedScore,
    /// `raw_score` on the single centipawn axis, see [`RawScore::to_centipawns`]
    pub centipawns: i32,
    pub best_move: Option<String>,
    pub depth: u32,
    pub nodes: u64,
    pub nps: u64,
}

impl Evaluation {
    /// Build an evaluation from engine output for a position where
    /// `side_to_move` was on move, seen by `perspective`.
    pub fn from_search(info: SearchInfo, side_to_move: Color, perspective: Color) -> Self {
        // Normalize and map to centipawns before flipping: Mate(0) has no sign.
        let normalized = normalize(info.score, side_to_move).relative_to(perspective);
        let cp = info.score.to_centipawns();
        let centipawns = if side_to_move == perspective { cp } else { cp.saturating_neg() };

        Self {
            raw_score: info.score.relative_to(side_to_move, perspective),
            normalized,
            centipawns,
            best_move: info.best_move,
            depth: info.depth,
            nodes: info.nodes,
            nps: info.nps,
        }
    }

    pub fn perspective(&self) -> Color {
        self.normalized.perspective
    }
}

/// Change in normalized evaluation caused by a move, in `before`'s perspective.
pub fn move_quality(before: NormalizedScore, after: NormalizedScore) -> f64 {
    after.for_side(before.perspective) - before.value
}

/// How much worse the played move is than the engine's choice, never negative.
pub fn evaluation_swing(best_cp: i32, played_cp: i32) -> u32 {
    let swing = i64::from(best_cp) - i64::from(played_cp);
    u32::try_from(swing.max(0)).unwrap_or(u32::MAX)
}

pub fn is_blunder(evaluation_swing: u32) -> bool {
    evaluation_swing > BLUNDER_THRESHOLD_CP
}

/// Heuristic 0-100 accuracy score; not a probability.
///
/// The engine's own choice scores 100. Anything else scores
/// `50 + 50 * move_quality`, clipped to [0, 100].
pub fn move_accuracy(played_is_best: bool, move_quality: f64) -> f64 {
    if played_is_best {
        return PERFECT_ACCURACY;
    }
    (50.0 + move_quality * 50.0).clamp(0.0, PERFECT_ACCURACY)
}
