mod summary;

pub use summary::{DailySummary, DayRecord, RhrSource};
