pub mod reading_service;
