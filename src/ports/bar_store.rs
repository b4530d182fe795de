//! Bar data access port.

use crate::domain::bar::Bar;
use crate::domain::error::ReplayError;
use crate::domain::resolution::Resolution;
use chrono::NaiveDateTime;

/// Read-only source of price bars.
///
/// `fetch_bars` returns rows with `begin <= timestamp <= end`, strictly
/// ordered by timestamp and free of duplicates. Stores never fabricate
/// sessions they do not hold.
pub trait BarStore {
    fn fetch_bars(
        &self,
        instrument: &str,
        resolution: Resolution,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, ReplayError>;

    /// Timestamp of the most recent bar held for the instrument.
    fn latest_timestamp(
        &self,
        instrument: &str,
        resolution: Resolution,
    ) -> Result<Option<NaiveDateTime>, ReplayError>;

    fn list_instruments(&self) -> Result<Vec<String>, ReplayError>;
}
