pub mod base;
pub mod encoder;
pub mod logging;
pub mod player;
pub mod sink;
pub mod sources;

pub use base::*;
pub use encoder::*;
pub use logging::*;
pub use player::*;
pub use sink::*;
pub use sources::*;
