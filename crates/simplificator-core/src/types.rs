use serde::{Deserialize, Serialize};

/// Highest complexity score a review can carry.
pub const MAX_SCORE: u8 = 10;

/// Coarse classification of a 0–10 complexity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// 0–3: nothing to cut.
    Simple,
    /// 4–6: could be simplified.
    Medium,
    /// 7–10: needs garage mode.
    OverEngineered,
}

impl ScoreBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => Self::Simple,
            4..=6 => Self::Medium,
            _ => Self::OverEngineered,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Simple => "Simple",
            Self::Medium => "Medium",
            Self::OverEngineered => "Over-engineered",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::Simple => "\u{2705}",         // ✅
            Self::Medium => "\u{1f7e1}",        // 🟡
            Self::OverEngineered => "\u{1f534}", // 🔴
        }
    }
}

impl std::fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.marker(), self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_edges() {
        assert_eq!(ScoreBand::from_score(0), ScoreBand::Simple);
        assert_eq!(ScoreBand::from_score(3), ScoreBand::Simple);
        assert_eq!(ScoreBand::from_score(4), ScoreBand::Medium);
        assert_eq!(ScoreBand::from_score(6), ScoreBand::Medium);
        assert_eq!(ScoreBand::from_score(7), ScoreBand::OverEngineered);
        assert_eq!(ScoreBand::from_score(MAX_SCORE), ScoreBand::OverEngineered);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ScoreBand::OverEngineered).unwrap();
        assert_eq!(json, r#""over_engineered""#);
    }
}
