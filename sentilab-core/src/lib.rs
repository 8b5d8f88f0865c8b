//! SentiLab Core: stationarity, Granger causality, ARMA/ARMAX fitting, model comparison.
//!
//! This crate holds the statistics and nothing else:
//! - Instrument series with per-lag sentiment columns
//! - Augmented Dickey-Fuller stationarity diagnostics
//! - Granger causality sweep over candidate lags
//! - ARMA(p, 0, q) and regression-with-ARMA-errors by exact likelihood
//! - AIC order search and a baseline vs augmented hold-out comparison
//!
//! No I/O happens here; loading and persistence live in `sentilab-runner`.

pub mod arma;
pub mod comparison;
pub mod granger;
pub mod order_selection;
pub mod series;
pub mod stationarity;
pub mod stats;

pub use arma::{fit, ArmaFit, ArmaOrder, CoefficientEstimate, FitFailure, FitOptions};
pub use comparison::{compare, split_index, ComparisonFailure, ComparisonMetrics, ModelStage};
pub use granger::{test_all, test_instrument, CausalityBatch, CausalityError, CausalityResult};
pub use order_selection::{select_order, OrderSelectionResult};
pub use series::{AlignedPairs, InstrumentSeries, Observation, SentimentLag, SeriesError};
pub use stationarity::{Stationarity, StationarityError, StationarityReport};
