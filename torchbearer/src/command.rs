use crate::flags::{ExposureMode, MessageType};

/// Package that can be sent to the spectrometer
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Command {
    Stop,
    GetDeviceId,
    SetExposureMode(ExposureMode),
    GetExposureMode,
    /// Integration time in microseconds
    SetExposureValue(u32),
    GetExposureValue,
    GetRange,
    GetData,
}

impl Command {
    pub fn message_type(&self) -> MessageType {
        use Command::*;
        match *self {
            Stop => MessageType::Stop,
            GetDeviceId => MessageType::GetDeviceId,
            SetExposureMode(_) => MessageType::SetExposureMode,
            GetExposureMode => MessageType::GetExposureMode,
            SetExposureValue(_) => MessageType::SetExposureValue,
            GetExposureValue => MessageType::GetExposureValue,
            GetRange => MessageType::GetRange,
            GetData => MessageType::GetData,
        }
    }

    /// Command payload, placed between message type and checksum
    pub fn payload(&self) -> Vec<u8> {
        use Command::*;
        match *self {
            // Device won't answer an empty id request
            GetDeviceId => vec![0x18],
            SetExposureMode(mode) => vec![mode.to_code()],
            SetExposureValue(t) => t.to_le_bytes().to_vec(),
            _ => Vec::new(),
        }
    }
}
