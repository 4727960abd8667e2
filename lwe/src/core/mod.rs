mod config;
mod engine;
mod window;

pub use config::*;
pub use engine::*;
pub use window::*;
