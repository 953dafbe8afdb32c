use crate::error::{Error, Result};
use core::{fmt, fmt::Display, str::FromStr};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

/// Type of a package, shared between a command and its response
#[derive(FromPrimitive, ToPrimitive, Debug, PartialEq, Eq, Clone, Copy)]
pub enum MessageType {
    Stop = 0x04,
    GetDeviceId = 0x08,
    SetExposureMode = 0x0A,
    GetExposureMode = 0x0B,
    SetExposureValue = 0x0C,
    GetExposureValue = 0x0D,
    GetRange = 0x0F,
    GetData = 0x33,
}

impl MessageType {
    // u8 is ambiguous type, avoid implementing TryFrom trait to make conversion from code more
    // explicit
    pub fn try_from_code(c: u8) -> Result<Self> {
        FromPrimitive::from_u8(c).ok_or(Error::UnknownMessageType(c))
    }

    pub fn to_code(self) -> u8 {
        // Every variant fits into a byte
        ToPrimitive::to_u8(&self).unwrap_or_default()
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use MessageType::*;
        f.write_str(match self {
            Stop => "stop",
            GetDeviceId => "get_device_id",
            SetExposureMode => "set_exposure_mode",
            GetExposureMode => "get_exposure_mode",
            SetExposureValue => "set_exposure_value",
            GetExposureValue => "get_exposure_value",
            GetRange => "get_range",
            GetData => "get_data",
        })
    }
}

#[derive(FromPrimitive, ToPrimitive, Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ExposureMode {
    #[default]
    Manual = 0x00,
    Automatic = 0x01,
}

impl ExposureMode {
    pub fn try_from_code(c: u8) -> Result<Self> {
        FromPrimitive::from_u8(c).ok_or(Error::InvalidData("unknown exposure mode"))
    }

    pub fn to_code(self) -> u8 {
        self as u8
    }
}

impl Display for ExposureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExposureMode::Manual => "manual",
            ExposureMode::Automatic => "automatic",
        })
    }
}

impl FromStr for ExposureMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(ExposureMode::Manual),
            "auto" | "automatic" => Ok(ExposureMode::Automatic),
            _ => Err(Error::config(format!("unknown exposure mode {s:?}"))),
        }
    }
}

/// Exposure verdict reported by the device along with every reading
#[derive(FromPrimitive, ToPrimitive, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ExposureStatus {
    Normal = 0x00,
    Over = 0x01,
    Under = 0x02,
}

impl ExposureStatus {
    pub fn try_from_code(c: u8) -> Result<Self> {
        FromPrimitive::from_u8(c).ok_or(Error::InvalidData("unknown exposure status"))
    }

    pub fn is_normal(self) -> bool {
        self == ExposureStatus::Normal
    }
}

impl Display for ExposureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExposureStatus::Normal => "normal",
            ExposureStatus::Over => "over",
            ExposureStatus::Under => "under",
        })
    }
}
