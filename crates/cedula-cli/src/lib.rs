pub mod cli;
pub mod errors;
pub mod ops;
pub mod output;

pub use errors::{CliError, CliResult};
