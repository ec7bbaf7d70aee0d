use serde::{Deserialize, Serialize};

/// A review about to be stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub title: String,
    pub code_snippet: String,
    pub description: String,
    pub score: u8,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// UUIDv7 string.
    pub id: String,
    pub title: String,
    pub code_snippet: String,
    pub description: String,
    pub score: u8,
    pub suggestions: Vec<String>,
    /// RFC 3339.
    pub created_at: String,
}


/// Direction of recent scores relative to older ones. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    None,
    Improving,
    Worsening,
    Stable,
}

/// Margin by which the recent average must differ to count as a trend.
const TREND_MARGIN: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total: usize,
    pub average: f64,
    pub trend: Trend,
}

impl ReviewStats {
    /// Compute stats over reviews ordered newest first.
    ///
    /// The newer half (`len / 2` entries) is compared against the rest.
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let total = reviews.len();
        if total == 0 {
            return Self {
                total,
                average: 0.0,
                trend: Trend::None,
            };
        }
        let average = mean(reviews);
        if total < 2 {
            return Self {
                total,
                average,
                trend: Trend::None,
            };
        }

        let (recent, older) = reviews.split_at(total / 2);
        let (recent, older) = (mean(recent), mean(older));
        let trend = if recent < older - TREND_MARGIN {
            Trend::Improving
        } else if recent > older + TREND_MARGIN {
            Trend::Worsening
        } else {
            Trend::Stable
        };

        Self {
            total,
            average,
            trend,
        }
    }
}

fn mean(reviews: &[Review]) -> f64 {
    let sum: u32 = reviews.iter().map(|r| u32::from(r.score)).sum();
    f64::from(sum) / reviews.len() as f64
}
