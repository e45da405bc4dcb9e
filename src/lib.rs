pub mod commands;
pub mod data;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
