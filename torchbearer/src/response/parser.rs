use nom::{
    combinator::{all_consuming, map_res},
    multi::many0,
    number::complete::{le_u16, le_u32, le_u64, le_u8},
    sequence::{pair, tuple},
    IResult,
};

use super::{ModeAck, Response, SpectralData};
use crate::{
    descramble::{descramble, exposure_time_ms},
    error::{Error, Result},
    flags::{ExposureMode, ExposureStatus, MessageType},
    spectrum::WavelengthRange,
};

/// Size of the fixed part of a data package, samples follow it
pub const DATA_HEADER_SIZE: usize = 19;

struct DataHeader {
    status: ExposureStatus,
    exposure_time_us: u32,
    encoded_exponent: u16,
    serial: u32,
    ex_info: u64,
}

fn exposure_status(input: &[u8]) -> IResult<&[u8], ExposureStatus> {
    map_res(le_u8, ExposureStatus::try_from_code)(input)
}

fn exposure_mode(input: &[u8]) -> IResult<&[u8], ExposureMode> {
    map_res(le_u8, ExposureMode::try_from_code)(input)
}

fn data_header(input: &[u8]) -> IResult<&[u8], DataHeader> {
    let (input, (status, exposure_time_us, encoded_exponent, serial, ex_info)) =
        tuple((exposure_status, le_u32, le_u16, le_u32, le_u64))(input)?;
    Ok((
        input,
        DataHeader {
            status,
            exposure_time_us,
            encoded_exponent,
            serial,
            ex_info,
        },
    ))
}

fn samples(input: &[u8]) -> IResult<&[u8], Vec<u16>> {
    all_consuming(many0(le_u16))(input)
}

fn parse_data(payload: &[u8]) -> Result<SpectralData> {
    let (rest, header) =
        data_header(payload).map_err(|_| Error::InvalidData("truncated data header"))?;
    let (_, words) = samples(rest).map_err(|_| Error::InvalidData("odd amount of sample bytes"))?;
    // Keys are bound to this very package, derive them every time
    let spectrum = descramble(
        &words,
        header.encoded_exponent,
        exposure_time_ms(header.exposure_time_us),
        header.serial,
        header.ex_info,
    );
    Ok(SpectralData {
        status: header.status,
        exposure_time_us: header.exposure_time_us,
        encoded_exponent: header.encoded_exponent,
        serial: header.serial,
        ex_info: header.ex_info,
        spectrum,
    })
}

fn parse_device_id(payload: &[u8]) -> Result<String> {
    if !payload.is_ascii() {
        return Err(Error::InvalidData("device id is not ASCII"));
    }
    core::str::from_utf8(payload)
        .map(|s| s.to_string())
        .map_err(|_| Error::InvalidData("device id is not ASCII"))
}

fn parse_range(payload: &[u8]) -> Result<WavelengthRange> {
    let (_, (start, stop)) = all_consuming(pair(le_u16::<_, nom::error::Error<_>>, le_u16))(payload)
        .map_err(|_| Error::InvalidData("range should be two 16 bit wavelengths"))?;
    WavelengthRange::new(start, stop)
}

/// Interprets payload of a package according to its type
pub fn parse_payload(message_type: MessageType, payload: &[u8]) -> Result<Response> {
    use MessageType::*;

    match message_type {
        Stop => Ok(Response::Stop),
        GetDeviceId => parse_device_id(payload).map(Response::DeviceId),
        SetExposureMode => match payload {
            [] => Err(Error::InvalidData("empty exposure mode acknowledgement")),
            [flag] => Ok(Response::SetExposureMode(ModeAck::Success(*flag == 0x00))),
            _ => exposure_mode(payload)
                .map(|(_, mode)| Response::SetExposureMode(ModeAck::Mode(mode)))
                .map_err(|_| Error::InvalidData("unknown exposure mode")),
        },
        GetExposureMode => exposure_mode(payload)
            .map(|(_, mode)| Response::ExposureMode(mode))
            .map_err(|_| Error::InvalidData("unknown exposure mode")),
        SetExposureValue => payload
            .first()
            .map(|flag| Response::SetExposureValue(*flag == 0x00))
            .ok_or(Error::InvalidData("empty exposure value acknowledgement")),
        GetExposureValue => all_consuming(le_u32::<_, nom::error::Error<_>>)(payload)
            .map(|(_, t)| Response::ExposureValue(t))
            .map_err(|_| Error::InvalidData("exposure value should be 32 bit")),
        GetRange => parse_range(payload).map(Response::Range),
        GetData => parse_data(payload).map(Response::Data),
    }
}
