pub mod parser;

use crate::{
    flags::{ExposureMode, ExposureStatus, MessageType},
    spectrum::WavelengthRange,
};

/// Answer to [`crate::command::Command::SetExposureMode`], firmware replies either with a
/// success flag or with the mode it switched to
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ModeAck {
    Success(bool),
    Mode(ExposureMode),
}

/// Content of a data package with intensities already descrambled
#[derive(PartialEq, Debug, Clone)]
pub struct SpectralData {
    pub status: ExposureStatus,
    pub exposure_time_us: u32,
    pub encoded_exponent: u16,
    pub serial: u32,
    pub ex_info: u64,
    pub spectrum: Vec<f64>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Response {
    Stop,
    DeviceId(String),
    SetExposureMode(ModeAck),
    ExposureMode(ExposureMode),
    SetExposureValue(bool),
    /// Integration time in microseconds
    ExposureValue(u32),
    Range(WavelengthRange),
    Data(SpectralData),
}

impl Response {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Stop => MessageType::Stop,
            Self::DeviceId(_) => MessageType::GetDeviceId,
            Self::SetExposureMode(_) => MessageType::SetExposureMode,
            Self::ExposureMode(_) => MessageType::GetExposureMode,
            Self::SetExposureValue(_) => MessageType::SetExposureValue,
            Self::ExposureValue(_) => MessageType::GetExposureValue,
            Self::Range(_) => MessageType::GetRange,
            Self::Data(_) => MessageType::GetData,
        }
    }
}
