//! Portfolio sources: an uploaded CSV file and the built-in brokerage
//! snapshot.

use crate::error::LoadError;
use crate::portfolio::Portfolio;
use crate::position::Position;
use once_cell::sync::Lazy;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const UPLOADED_CSV: &str = "Uploaded CSV";
pub const INTERACTIVE_BROKERS_TRUST: &str = "Interactive Brokers Trust";

const REQUIRED_COLUMNS: [&str; 4] = ["Symbol", "Quantity", "Cost", "Current"];

// (symbol, quantity, cost, current)
const IB_POSITIONS: [(&str, f64, f64, f64); 15] = [
    ("AAPL", 700.0, 144.39, 218.27),
    ("AMT", 250.0, 215.66, 216.23),
    ("BMY", 500.0, 64.63, 61.07),
    ("BYND", 1.0, 120.06, 3.55),
    ("GOOG", 2300.0, 94.44, 166.25),
    ("MA", 200.0, 292.10, 535.69),
    ("NVDA", 6000.0, 13.52, 117.70),
    ("PANW", 528.0, 148.51, 182.32),
    ("PFE", 850.0, 35.70, 26.28),
    ("SPY", 300.0, 482.55, 563.98),
    ("TGT", 350.0, 173.80, 104.06),
    ("TSLA", 215.0, 297.17, 248.71),
    ("VOO", 200.0, 372.32, 520.26),
    ("VTRS", 124.0, 15.78, 9.15),
    ("USNQX", 1153.805, 32.27, 48.63),
];

static IB_SNAPSHOT: Lazy<Portfolio> = Lazy::new(|| {
    Portfolio::with_positions(
        INTERACTIVE_BROKERS_TRUST,
        IB_POSITIONS
            .iter()
            .map(|&(symbol, quantity, cost, current)| Position::new(symbol, quantity, cost, current))
            .collect(),
    )
});

/// The fixed Interactive Brokers snapshot.
pub fn interactive_brokers_trust() -> Portfolio {
    IB_SNAPSHOT.clone()
}

/// Parse a CSV with at least the columns Symbol, Quantity, Cost and Current.
/// Column order does not matter and extra columns are ignored.
pub fn load_csv<R: Read>(reader: R) -> Result<Portfolio, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| LoadError::Csv(e.to_string()))?
        .clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(LoadError::MissingColumn(column));
        }
    }

    let mut portfolio = Portfolio::new(UPLOADED_CSV);
    for (i, record) in rdr.deserialize::<Position>().enumerate() {
        let position = record.map_err(|e| LoadError::InvalidRow {
            row: i + 1,
            message: e.to_string(),
        })?;
        portfolio.add_position(position);
    }

    tracing::info!(
        positions = portfolio.positions.len(),
        "loaded uploaded portfolio"
    );
    Ok(portfolio)
}

pub fn load_csv_file(path: &Path) -> Result<Portfolio, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_csv(file)
}

fn register(portfolios: &mut Vec<Portfolio>, portfolio: Portfolio) -> Result<(), LoadError> {
    if portfolios.iter().any(|p| p.name == portfolio.name) {
        return Err(LoadError::DuplicatePortfolio(portfolio.name));
    }
    portfolios.push(portfolio);
    Ok(())
}

/// All portfolios in display order: the upload (if any), then the snapshot.
pub fn load_portfolios(upload: Option<&Path>) -> Result<Vec<Portfolio>, LoadError> {
    let mut portfolios = Vec::new();
    if let Some(path) = upload {
        register(&mut portfolios, load_csv_file(path)?)?;
    }
    register(&mut portfolios, interactive_brokers_trust())?;
    Ok(portfolios)
}
