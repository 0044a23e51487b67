pub(crate) mod actor;
pub(crate) mod dispatch;
pub mod events;
pub mod frame_player;
pub mod loader;
pub mod queue;
pub mod session;
pub mod state;
pub mod track;

pub use events::{NowPlaying, PlaybackEvent, TrackEndReason};
pub use queue::TrackQueue;
pub use session::{JoinOutcome, PlaybackSession, SessionDeps};
pub use state::{Command, CommandOutcome, PlayState};
pub use track::{AuthoredTrack, TrackRef};
