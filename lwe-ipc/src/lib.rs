pub mod command;
pub mod state;

pub use command::{
    parse_geometry, Command, LaunchRequest, LoopConfig, SoundConfig, WindowMode,
};
pub use state::EngineState;
