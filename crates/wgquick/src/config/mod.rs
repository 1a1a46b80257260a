//! Interface configuration model and its file format.

mod parser;
mod types;

pub use parser::{load_config, parse_config};
pub use types::Config;
