pub mod decision_routes;
pub mod ingest_routes;
pub mod reading_routes;
