pub mod decoder;
pub mod encoder;
pub mod frame;

mod framed;

pub use framed::FrameCodec;
