pub mod bill;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod legislators;
pub mod query;
pub mod report;
pub mod roll;
pub mod schema;
pub mod timestamp;

mod xml;
