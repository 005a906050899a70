pub mod auth;
pub mod db;
pub mod quiz;
pub mod settings;
pub mod telemetry;
pub mod transfer;
