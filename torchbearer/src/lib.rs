pub mod acquisition;
pub mod aggregator;
pub mod auto_exposure;
pub mod backend;
pub mod codec;
pub mod command;
pub mod descramble;
pub mod error;
pub mod flags;
pub mod io_adapter;
pub mod response;
pub mod session;
pub mod spectrum;

pub use acquisition::{
    spawn_acquisition, AcquisitionConfig, AggregationConfig, ExposureControl,
};
pub use aggregator::{AggregateFunc, SlidingMax, SpectrumAggregator};
pub use auto_exposure::AutoExposureConfig;
pub use backend::{Backend, DeviceSpec};
pub use codec::FrameCodec;
pub use command::Command;
pub use error::{Error, ErrorKind, Result};
pub use flags::{ExposureMode, ExposureStatus, MessageType};
pub use io_adapter::{IoAdapter, StdIoAdapter};
pub use response::{Response, SpectralData};
pub use session::{Session, SessionFacts};
pub use spectrum::{BasicInfo, Spectrum, WavelengthRange};
