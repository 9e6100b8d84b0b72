pub mod frame;
pub mod video;

pub use frame::FrameData;
pub use video::VideoDecoder;
