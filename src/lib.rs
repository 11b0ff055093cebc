pub mod db;
pub mod decisions;
pub mod ingest;
pub mod nodes;
pub mod server;
pub mod version;
pub mod weather;
pub mod web;
