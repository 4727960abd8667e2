mod flags;
mod locator;
mod monitor;
mod query;

pub use flags::*;
pub use locator::*;
pub use monitor::*;
pub use query::*;
