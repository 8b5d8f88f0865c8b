//! Loading of the merged per-ticker table.
//!
//! Expected header: `date, ticker, log_return, sentiment_mean` plus any subset
//! of `sentiment_lag1..sentiment_lag6`. Extra columns are ignored and empty
//! cells are missing values; nothing is imputed. Rows are grouped by ticker
//! and sorted by date, and a repeated (ticker, date) pair is an error.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, info};

use sentilab_core::series::{InstrumentSeries, Observation, SentimentLag, SeriesError};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("merged table not found: {0}")]
    NotFound(PathBuf),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("required column '{0}' missing from merged table")]
    MissingColumn(&'static str),
    #[error("row {row}: cannot parse date '{value}'")]
    BadDate { row: usize, value: String },
    #[error("row {row}: cannot parse {column} value '{value}'")]
    BadNumber {
        row: usize,
        column: String,
        value: String,
    },
    #[error("ticker '{ticker}': {source}")]
    Series {
        ticker: String,
        #[source]
        source: SeriesError,
    },
}

/// The merged table split into per-ticker series.
#[derive(Debug, Clone)]
pub struct MergedTable {
    /// Keyed (and therefore iterated) in ticker order.
    pub instruments: BTreeMap<String, InstrumentSeries>,
    /// Lag columns present in the header.
    pub available_lags: BTreeSet<SentimentLag>,
    /// BLAKE3 over the parsed table in ticker/date order.
    pub dataset_hash: String,
    pub rows: usize,
}

impl MergedTable {
    pub fn tickers(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }
}

struct Columns {
    date: usize,
    ticker: usize,
    log_return: usize,
    sentiment_mean: usize,
    lags: Vec<(SentimentLag, usize)>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or(LoadError::MissingColumn(name))
        };
        let lags = SentimentLag::all()
            .filter_map(|lag| {
                let name = lag.column_name();
                headers.iter().position(|h| h.trim() == name).map(|i| (lag, i))
            })
            .collect();
        Ok(Self {
            date: find("date")?,
            ticker: find("ticker")?,
            log_return: find("log_return")?,
            sentiment_mean: find("sentiment_mean")?,
            lags,
        })
    }
}

/// Load the merged table at `path`.
pub fn load_merged(path: &Path) -> Result<MergedTable, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let table = read_merged(reader)?;
    info!(
        path = %path.display(),
        rows = table.rows,
        tickers = table.instruments.len(),
        lags = table.available_lags.len(),
        "loaded merged table"
    );
    Ok(table)
}

/// Parse a merged table from any reader.
pub fn read_merged<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<MergedTable, LoadError> {
    let columns = Columns::from_headers(reader.headers()?)?;
    let available_lags = columns.lags.iter().map(|(lag, _)| *lag).collect();

    let mut grouped: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
    let mut rows = 0;
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let row = i + 2;
        let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

        let date = parse_date(cell(columns.date)).ok_or_else(|| LoadError::BadDate {
            row,
            value: cell(columns.date).to_string(),
        })?;
        let mut obs = Observation::new(
            date,
            parse_value(cell(columns.log_return), row, "log_return")?,
            parse_value(cell(columns.sentiment_mean), row, "sentiment_mean")?,
        );
        for (lag, idx) in &columns.lags {
            let value = parse_value(cell(*idx), row, &lag.column_name())?;
            obs.set_sentiment_lag(*lag, value);
        }
        grouped.entry(cell(columns.ticker).to_string()).or_default().push(obs);
        rows += 1;
    }

    let mut instruments = BTreeMap::new();
    for (ticker, observations) in grouped {
        debug!(ticker = %ticker, n = observations.len(), "grouped observations");
        let series = InstrumentSeries::from_unsorted(ticker.clone(), observations)
            .map_err(|source| LoadError::Series {
                ticker: ticker.clone(),
                source,
            })?;
        instruments.insert(ticker, series);
    }

    let dataset_hash = compute_dataset_hash(&instruments);
    Ok(MergedTable {
        instruments,
        available_lags,
        dataset_hash,
        rows,
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Empty, `nan` and non-finite cells are missing.
fn parse_value(raw: &str, row: usize, column: &str) -> Result<Option<f64>, LoadError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let value: f64 = raw.parse().map_err(|_| LoadError::BadNumber {
        row,
        column: column.to_string(),
        value: raw.to_string(),
    })?;
    Ok(value.is_finite().then_some(value))
}

/// Deterministic BLAKE3 hash over every parsed value, in ticker then date order.
fn compute_dataset_hash(instruments: &BTreeMap<String, InstrumentSeries>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (ticker, series) in instruments {
        hasher.update(ticker.as_bytes());
        for obs in series.observations() {
            hasher.update(obs.date.to_string().as_bytes());
            hash_value(&mut hasher, obs.log_return);
            hash_value(&mut hasher, obs.sentiment_mean);
            for value in obs.sentiment_lags {
                hash_value(&mut hasher, value);
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn hash_value(hasher: &mut blake3::Hasher, value: Option<f64>) {
    match value {
        Some(v) => {
            hasher.update(&[1]);
            hasher.update(&v.to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> Result<MergedTable, LoadError> {
        read_merged(csv::Reader::from_reader(text.as_bytes()))
    }

    const SAMPLE: &str = "\
date,ticker,log_return,sentiment_mean,sentiment_lag1,sentiment_lag2,volume
2024-01-03,BBB,0.01,0.2,0.1,,100
2024-01-02,BBB,-0.02,0.1,,,100
2024-01-02,AAA,0.005,,0.3,0.4,200
";

    #[test]
    fn groups_by_ticker_and_sorts_by_date() {
        let table = read(SAMPLE).unwrap();
        assert_eq!(table.rows, 3);
        assert_eq!(table.tickers(), vec!["AAA".to_string(), "BBB".to_string()]);

        let bbb = table.instruments["BBB"].observations();
        assert_eq!(bbb[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bbb[0].log_return, Some(-0.02));
        assert_eq!(bbb[1].sentiment_lag(SentimentLag::ONE), Some(0.1));

        let aaa = &table.instruments["AAA"].observations()[0];
        assert_eq!(aaa.sentiment_mean, None);
        assert_eq!(aaa.sentiment_lag(SentimentLag::new(2).unwrap()), Some(0.4));
    }

    #[test]
    fn only_present_lag_columns_are_available() {
        let table = read(SAMPLE).unwrap();
        let lags: Vec<usize> = table.available_lags.iter().map(|l| l.get()).collect();
        assert_eq!(lags, vec![1, 2]);
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let text = "date,ticker,log_return,sentiment_mean\n\
                    2024-01-02,AAA,0.1,0.1\n\
                    2024-01-02,AAA,0.2,0.2\n";
        assert!(matches!(
            read(text),
            Err(LoadError::Series {
                source: SeriesError::DuplicateDate(_),
                ..
            })
        ));
    }

    #[test]
    fn missing_required_column_is_reported() {
        let text = "date,ticker,log_return\n2024-01-02,AAA,0.1\n";
        assert!(matches!(read(text), Err(LoadError::MissingColumn("sentiment_mean"))));
    }

    #[test]
    fn bad_cells_report_their_row() {
        let text = "date,ticker,log_return,sentiment_mean\n2024-01-02,AAA,abc,0.1\n";
        match read(text) {
            Err(LoadError::BadNumber { row, column, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "log_return");
            }
            other => panic!("unexpected {other:?}"),
        }
        let text = "date,ticker,log_return,sentiment_mean\n02/01/2024,AAA,0.1,0.1\n";
        assert!(matches!(read(text), Err(LoadError::BadDate { row: 2, .. })));
    }

    #[test]
    fn timestamps_and_nan_cells_are_accepted() {
        let text = "date,ticker,log_return,sentiment_mean\n2024-01-02 00:00:00,AAA,nan,0.1\n";
        let table = read(text).unwrap();
        let obs = &table.instruments["AAA"].observations()[0];
        assert_eq!(obs.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(obs.log_return, None);
    }

    #[test]
    fn hash_ignores_row_order_but_not_values() {
        let a = read(SAMPLE).unwrap();
        let reordered = "\
date,ticker,log_return,sentiment_mean,sentiment_lag1,sentiment_lag2,volume
2024-01-02,AAA,0.005,,0.3,0.4,200
2024-01-02,BBB,-0.02,0.1,,,100
2024-01-03,BBB,0.01,0.2,0.1,,999
";
        let b = read(reordered).unwrap();
        assert_eq!(a.dataset_hash, b.dataset_hash);

        let changed = SAMPLE.replace("0.005", "0.006");
        assert_ne!(a.dataset_hash, read(&changed).unwrap().dataset_hash);
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(
            load_merged(Path::new("/nonexistent/merged.csv")),
            Err(LoadError::NotFound(_))
        ));
    }
}
