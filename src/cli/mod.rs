mod args;
mod repl;
pub mod theme;

pub use args::CliArgs;
pub use repl::{InputAction, classify_input, run_repl};
