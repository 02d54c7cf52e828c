//! Process bootstrap shared by every FMF binary
//!
//! - Configuration loading and validation

pub mod config;

pub use config::load_config;
