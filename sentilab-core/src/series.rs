//! Per-instrument observation series and date alignment.
//!
//! A series is only valid when its dates are strictly increasing. Lag shifts
//! and the chronological train/test split both rely on that ordering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest sentiment lag precomputed upstream (`sentiment_lag1..sentiment_lag6`).
pub const MAX_PRECOMPUTED_LAG: usize = 6;

/// A validated sentiment lag in `1..=MAX_PRECOMPUTED_LAG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SentimentLag(usize);

impl SentimentLag {
    pub const ONE: SentimentLag = SentimentLag(1);

    pub fn new(lag: usize) -> Option<Self> {
        (1..=MAX_PRECOMPUTED_LAG).contains(&lag).then_some(Self(lag))
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// Name of the merged-table column holding this lag.
    pub fn column_name(self) -> String {
        format!("sentiment_lag{}", self.0)
    }

    fn slot(self) -> usize {
        self.0 - 1
    }

    pub fn all() -> impl Iterator<Item = SentimentLag> {
        (1..=MAX_PRECOMPUTED_LAG).map(SentimentLag)
    }
}

impl std::fmt::Display for SentimentLag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the merged table for a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub log_return: Option<f64>,
    pub sentiment_mean: Option<f64>,
    pub sentiment_lags: [Option<f64>; MAX_PRECOMPUTED_LAG],
}

impl Observation {
    pub fn new(date: NaiveDate, log_return: Option<f64>, sentiment_mean: Option<f64>) -> Self {
        Self {
            date,
            log_return,
            sentiment_mean,
            sentiment_lags: [None; MAX_PRECOMPUTED_LAG],
        }
    }

    pub fn sentiment_lag(&self, lag: SentimentLag) -> Option<f64> {
        self.sentiment_lags[lag.slot()]
    }

    pub fn set_sentiment_lag(&mut self, lag: SentimentLag, value: Option<f64>) {
        self.sentiment_lags[lag.slot()] = value;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("dates out of order at index {index}: {prev} then {next}")]
    Unordered {
        index: usize,
        prev: NaiveDate,
        next: NaiveDate,
    },
    #[error("duplicate date {0}")]
    DuplicateDate(NaiveDate),
}

/// Ordered observations for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSeries {
    pub ticker: String,
    observations: Vec<Observation>,
}

impl InstrumentSeries {
    /// Build from observations that must already be in strictly increasing date order.
    pub fn new(
        ticker: impl Into<String>,
        observations: Vec<Observation>,
    ) -> Result<Self, SeriesError> {
        for (i, w) in observations.windows(2).enumerate() {
            if w[1].date == w[0].date {
                return Err(SeriesError::DuplicateDate(w[1].date));
            }
            if w[1].date < w[0].date {
                return Err(SeriesError::Unordered {
                    index: i + 1,
                    prev: w[0].date,
                    next: w[1].date,
                });
            }
        }
        Ok(Self {
            ticker: ticker.into(),
            observations,
        })
    }

    /// Build from observations in any order; sorts by date and rejects duplicates.
    pub fn from_unsorted(
        ticker: impl Into<String>,
        mut observations: Vec<Observation>,
    ) -> Result<Self, SeriesError> {
        observations.sort_by_key(|o| o.date);
        Self::new(ticker, observations)
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// `(log_return, sentiment_mean)` pairs with rows missing either dropped.
    pub fn return_sentiment_pairs(&self) -> AlignedPairs {
        self.aligned_by(|o| o.sentiment_mean)
    }

    /// `(log_return, sentiment_lagN)` pairs with rows missing either dropped.
    pub fn return_lagged_sentiment_pairs(&self, lag: SentimentLag) -> AlignedPairs {
        self.aligned_by(|o| o.sentiment_lag(lag))
    }

    fn aligned_by<F>(&self, exog: F) -> AlignedPairs
    where
        F: Fn(&Observation) -> Option<f64>,
    {
        let mut pairs = AlignedPairs::default();
        for o in &self.observations {
            if let (Some(y), Some(x)) = (o.log_return, exog(o)) {
                if y.is_finite() && x.is_finite() {
                    pairs.dates.push(o.date);
                    pairs.target.push(y);
                    pairs.exog.push(x);
                }
            }
        }
        pairs
    }
}

/// Target and exogenous values aligned on date, with no missing entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedPairs {
    pub dates: Vec<NaiveDate>,
    pub target: Vec<f64>,
    pub exog: Vec<f64>,
}

impl AlignedPairs {
    /// Pair two equal-length vectors under consecutive synthetic dates
    /// (truncated to the shorter input).
    pub fn from_vectors(target: Vec<f64>, exog: Vec<f64>) -> Self {
        let n = target.len().min(exog.len());
        let base = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
        let dates = (0..n)
            .map(|i| base + chrono::Duration::days(i as i64))
            .collect();
        Self {
            dates,
            target: target[..n].to_vec(),
            exog: exog[..n].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Drop NaN/inf entries, keeping order.
pub fn drop_missing(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}
