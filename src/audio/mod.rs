pub mod codec;
pub mod constants;
pub mod demux;
pub mod frame;
pub mod processor;
pub mod resample;

pub use frame::EncodedFrame;
pub use processor::{EncoderFactory, FrameEncoder, OpusTranscoderFactory};
