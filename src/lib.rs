pub mod batch;
pub mod check;
pub mod export;
pub mod extract;
pub mod ingest;
pub mod progress;
pub mod report;
pub mod row;
pub mod settings;
pub mod table;
