/// CSV and JSON export of run results.
pub mod export;
