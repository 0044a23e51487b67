pub mod opus_encoder;

pub use opus_encoder::OpusFrameEncoder;
