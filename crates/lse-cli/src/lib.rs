pub mod cli;
pub mod feeder;

pub use cli::{Cli, Commands, ConfigCommands};
