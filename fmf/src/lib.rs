//! Process plumbing shared by the FMF binaries

pub mod cli;
pub mod runtime;

pub use cli::parse_args;
pub use runtime::{shutdown_signal, spawn_shutdown_listener, Runtime};
