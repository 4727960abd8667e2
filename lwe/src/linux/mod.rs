mod processes;
mod runner;
mod sandbox;
mod wmctrl;

pub use processes::*;
pub use runner::*;
pub use sandbox::*;
pub use wmctrl::*;
