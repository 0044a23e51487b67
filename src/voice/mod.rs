pub mod rtp;
pub mod sink;

pub use rtp::{RtpConnector, RtpSink};
pub use sink::{BoxedSink, SinkConnector, SinkSlot, VoiceSink};
