pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod feed;
pub mod geocode;
pub mod normalizer;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod workers;
