//! Price loading for the runner.
//!
//! Two sources, selected by the `[data]` config section:
//! 1. A pair of daily CSV files (`date,open,high,low,close`, one header row)
//!    for the traded index and its volatility reference
//! 2. Synthetic series generated from a seed (developer-only; tagged)
//!
//! Either way the two series are aligned day by day and hashed with BLAKE3
//! so a result can be traced back to the exact data it ran on.

use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use marginlab_core::data::{align_series, AlignError, DayPrices};
use marginlab_core::domain::DailyBar;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DataSection;

/// Date formats accepted in the first CSV column, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {source_name}: {error}")]
    Csv { source_name: String, error: csv::Error },

    #[error("{source_name} line {line}: {reason}")]
    MalformedRow {
        source_name: String,
        line: u64,
        reason: String,
    },

    #[error("{source_name}: bar on {date} fails OHLC sanity checks")]
    InvalidBar { source_name: String, date: NaiveDate },

    #[error("{source_name}: duplicate date {date}")]
    DuplicateDate { source_name: String, date: NaiveDate },

    #[error("{source_name} contains no bars")]
    Empty { source_name: String },

    #[error("no data source configured (set index_path and volatility_path, or synthetic)")]
    NoSource,

    #[error(transparent)]
    Align(#[from] AlignError),
}

/// Aligned index/volatility days with provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub days: Vec<DayPrices>,
    /// BLAKE3 over every date and OHLC value of both series.
    pub dataset_hash: String,
    pub synthetic: bool,
}

/// Load both series as configured and align them.
///
/// `start` anchors the synthetic calendar; file data is returned whole and
/// windowed by the caller.
pub fn load_data(data: &DataSection, start: Option<NaiveDate>) -> Result<LoadedData, LoadError> {
    let (index, volatility, synthetic) = if data.synthetic {
        let start = start.unwrap_or_else(default_synthetic_start);
        warn!(seed = data.seed, days = data.days, "generating synthetic data, results are tagged as synthetic");
        let (index, volatility) = generate_synthetic_series(data.seed, start, data.days);
        (index, volatility, true)
    } else {
        let (Some(index_path), Some(volatility_path)) = (&data.index_path, &data.volatility_path) else {
            return Err(LoadError::NoSource);
        };
        (read_daily_csv(index_path)?, read_daily_csv(volatility_path)?, false)
    };

    let days = align_series(&index, &volatility)?;
    let dataset_hash = compute_dataset_hash(&days);
    info!(days = days.len(), synthetic, hash = %&dataset_hash[..12], "data loaded");

    Ok(LoadedData {
        days,
        dataset_hash,
        synthetic,
    })
}

/// Read one daily CSV file.
pub fn read_daily_csv(path: &Path) -> Result<Vec<DailyBar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_daily_csv(file, &path.display().to_string())
}

/// Parse daily bars from any reader.
///
/// Rows whose price fields are `null` or `.` (market holidays in common
/// vendor exports) are skipped. Bars are returned in ascending date order.
pub fn parse_daily_csv<R: Read>(reader: R, source_name: &str) -> Result<Vec<DailyBar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let record = record.map_err(|error| LoadError::Csv {
            source_name: source_name.to_string(),
            error,
        })?;
        match parse_record(&record, source_name)? {
            Some(bar) => bars.push(bar),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(source = source_name, skipped, "skipped rows without prices");
    }
    if bars.is_empty() {
        return Err(LoadError::Empty {
            source_name: source_name.to_string(),
        });
    }

    bars.sort_by_key(|b| b.date);
    if let Some(pair) = bars.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(LoadError::DuplicateDate {
            source_name: source_name.to_string(),
            date: pair[0].date,
        });
    }
    Ok(bars)
}

fn parse_record(record: &StringRecord, source_name: &str) -> Result<Option<DailyBar>, LoadError> {
    let line = record.position().map_or(0, |p| p.line());
    let malformed = |reason: String| LoadError::MalformedRow {
        source_name: source_name.to_string(),
        line,
        reason,
    };

    if record.len() < 5 {
        return Err(malformed(format!("expected 5 columns, found {}", record.len())));
    }

    let raw_date = &record[0];
    let date = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw_date, fmt).ok())
        .ok_or_else(|| malformed(format!("unrecognized date '{raw_date}'")))?;

    if (1..5).any(|i| matches!(&record[i], "null" | "." | "")) {
        return Ok(None);
    }

    let mut prices = [0.0; 4];
    for (slot, i) in prices.iter_mut().zip(1..5) {
        *slot = record[i]
            .replace(',', "")
            .parse::<f64>()
            .map_err(|e| malformed(format!("column {i} '{}': {e}", &record[i])))?;
    }
    let [open, high, low, close] = prices;

    let bar = DailyBar::new(date, open, high, low, close);
    if !bar.is_sane() {
        return Err(LoadError::InvalidBar {
            source_name: source_name.to_string(),
            date,
        });
    }
    Ok(Some(bar))
}

/// Compute a deterministic BLAKE3 hash over both aligned series.
pub fn compute_dataset_hash(days: &[DayPrices]) -> String {
    let mut hasher = blake3::Hasher::new();
    for day in days {
        hasher.update(day.date.to_string().as_bytes());
        for bar in [&day.index, &day.volatility] {
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn default_synthetic_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or(NaiveDate::MIN)
}

/// Generate a synthetic index and volatility pair for testing/development.
///
/// Volatility mean-reverts around 18 with occasional spikes; the index takes
/// a random walk whose daily range scales with the volatility reading. Both
/// share a weekday calendar starting at `start`. These are clearly fake and
/// tagged as synthetic.
pub fn generate_synthetic_series(seed: u64, start: NaiveDate, days: usize) -> (Vec<DailyBar>, Vec<DailyBar>) {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // Deterministic seed from the configured seed
    let seed_bytes = blake3::hash(&seed.to_le_bytes());
    let mut rng = StdRng::from_seed(*seed_bytes.as_bytes());

    let mut index = Vec::with_capacity(days);
    let mut volatility = Vec::with_capacity(days);
    let mut price = 3000.0_f64;
    let mut vol = 18.0_f64;
    let mut current = start;

    while index.len() < days {
        // Skip weekends (simple heuristic)
        let weekday = current.weekday();
        if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
            current += chrono::Duration::days(1);
            continue;
        }

        let vol_open = vol;
        let shock = if rng.gen_bool(0.02) {
            rng.gen_range(5.0..15.0)
        } else {
            rng.gen_range(-1.5..1.5)
        };
        vol = (vol + 0.1 * (18.0 - vol) + shock).clamp(9.0, 80.0);
        let vol_high = vol_open.max(vol) * (1.0 + rng.gen_range(0.0..0.05));
        let vol_low = vol_open.min(vol) * (1.0 - rng.gen_range(0.0..0.05));
        volatility.push(DailyBar::new(current, vol_open, vol_high, vol_low, vol));

        // Daily sigma implied by the annualized volatility reading
        let sigma = vol_open / 100.0 / 252.0_f64.sqrt();
        let daily_return = 0.0003 + rng.gen_range(-1.7..1.7) * sigma - (vol - vol_open) / 400.0;
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.5) * sigma);
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.5) * sigma);
        index.push(DailyBar::new(current, open, high, low, close));

        price = close;
        current += chrono::Duration::days(1);
    }

    (index, volatility)
}
