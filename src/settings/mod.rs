//! Settings file loading and command-line arguments.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
