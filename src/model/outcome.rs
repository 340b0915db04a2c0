//! Battle outcome payloads.
//!
//! The shape of an encoded result depends on the battle's outcome kind, so
//! the payload is a tagged union rather than an untyped map: every consumer
//! gets compile-time coverage over the four shapes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::entities::PerformerId;
use super::errors::{EngineError, EngineResult};

/// A preselection score, 0.00 to 10.00, held as hundredths.
///
/// Scores carry exactly two decimal places and are compared for equality
/// during tie detection, so they are stored as an integer rather than a
/// float.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Score(u16);

impl Score {
    /// The maximum score, assigned to guest performers.
    pub const MAX: Score = Score(1000);

    /// Build a score from a decimal value. Rejects values outside 0-10 and
    /// values finer than two decimal places.
    pub fn try_from_f64(value: f64) -> EngineResult<Self> {
        if !value.is_finite() || !(0.0..=10.0).contains(&value) {
            return Err(EngineError::InvalidArgument(format!(
                "score {value} out of range 0-10"
            )));
        }
        let hundredths = value * 100.0;
        if (hundredths - hundredths.round()).abs() > 1e-6 {
            return Err(EngineError::InvalidArgument(format!(
                "score {value} has more than two decimal places"
            )));
        }
        Ok(Self(hundredths.round() as u16))
    }

    /// Build a score from a hundredths count, e.g. as stored in a database
    /// column. Rejects values above 10.00.
    pub fn from_hundredths(hundredths: u16) -> EngineResult<Self> {
        if hundredths > 1000 {
            return Err(EngineError::InvalidArgument(format!(
                "score of {hundredths} hundredths exceeds 10.00"
            )));
        }
        Ok(Self(hundredths))
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        f64::from(self.0) / 100.0
    }

    #[must_use]
    pub fn hundredths(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

impl TryFrom<f64> for Score {
    type Error = EngineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::try_from_f64(value)
    }
}

impl Serialize for Score {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Self::try_from_f64(value).map_err(serde::de::Error::custom)
    }
}

/// Discriminant of the four outcome payload shapes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Scored,
    WinDrawLoss,
    Tiebreak,
    WinLoss,
}

impl OutcomeKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scored => "scored",
            Self::WinDrawLoss => "win_draw_loss",
            Self::Tiebreak => "tiebreak",
            Self::WinLoss => "win_loss",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OutcomeKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scored" => Ok(Self::Scored),
            "win_draw_loss" => Ok(Self::WinDrawLoss),
            "tiebreak" => Ok(Self::Tiebreak),
            "win_loss" => Ok(Self::WinLoss),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown outcome kind {other:?}"
            ))),
        }
    }
}

/// Encoded battle result, keyed by the battle's outcome kind.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Preselection: every participant receives a judge score.
    Scored { scores: BTreeMap<PerformerId, Score> },
    /// Pools: a winner, or a draw when `winner_id` is absent.
    WinDrawLoss { winner_id: Option<PerformerId> },
    /// Tiebreak resolution: the performers who survived the voting rounds.
    Tiebreak { winner_ids: Vec<PerformerId> },
    /// Finals: a single winner, draws not permitted.
    WinLoss { winner_id: PerformerId },
}

impl Outcome {
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Scored { .. } => OutcomeKind::Scored,
            Self::WinDrawLoss { .. } => OutcomeKind::WinDrawLoss,
            Self::Tiebreak { .. } => OutcomeKind::Tiebreak,
            Self::WinLoss { .. } => OutcomeKind::WinLoss,
        }
    }
}
