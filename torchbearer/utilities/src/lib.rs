use bytes::BytesMut;
use lazy_static::lazy_static;
use manifest_dir_macros::exist_relative_path;
use mockall::mock;
use nom::{
    bytes::complete::take_while_m_n,
    character::complete::multispace0,
    combinator::{all_consuming, map_res},
    multi::many1,
    sequence::delimited,
    IResult,
};
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
};
use torchbearer::{
    codec::frame::{decode_frame, encode_frame, Direction},
    descramble::{encode_exponent, exposure_time_ms, scramble},
    ExposureMode, ExposureStatus, MessageType, WavelengthRange,
};

/// Decodes a pair of chars formatted as hex into a byte. For example "FF" -> 255
fn hex_byte(input: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |hex| u8::from_str_radix(hex, 16),
    )(input)
}

/// Parses a hex dump, bytes may be separated by any whitespace including new lines
pub fn parse_hex_str(input: &str) -> IResult<&str, Vec<u8>> {
    all_consuming(many1(delimited(multispace0, hex_byte, multispace0)))(input)
}

lazy_static! {
    /// Single `GET_DATA` package: normal exposure of 50 ms, 401 samples decoding to
    /// `(1000 + i) / 100`
    pub static ref DATA_FRAME: Vec<u8> = {
        let hex_str = include_str!(exist_relative_path!("../resources/test/data_frame.txt"));
        let (_, data) = parse_hex_str(hex_str)
            .expect("Failed to parse resources/test/data_frame.txt");
        data
    };
    /// Range, exposure mode, [`struct@DATA_FRAME`] and stop packages followed by the first 40
    /// bytes of another data package
    pub static ref CAPTURE_EXAMPLE: Vec<u8> = {
        let hex_str = include_str!(exist_relative_path!("../resources/test/capture_example.txt"));
        let (_, data) = parse_hex_str(hex_str)
            .expect("Failed to parse resources/test/capture_example.txt");
        data
    };
}

mock! {
    pub IO {}
    impl Read for IO {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    }
    impl Write for IO {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
        fn flush(&mut self) -> std::io::Result<()>;
    }
}

pub const FULL_SCALE: u16 = u16::MAX;

/// Simulated spectrometer speaking the wire protocol.
///
/// Intensity of every pixel grows linearly with exposure time and clips at [`FULL_SCALE`].
/// Reads return at most `chunk_size` bytes. Reading while there is nothing to send fails with
/// [`io::ErrorKind::UnexpectedEof`], so a host waiting for a package that never comes fails
/// instead of hanging.
pub struct FakeTorchBearer {
    pub device_id: String,
    pub range: WavelengthRange,
    pub mode: ExposureMode,
    pub exposure_time_us: u32,
    pub serial: u32,
    pub ex_info: u64,
    /// Counts per µs of the brightest pixel
    pub brightness: f64,
    pub chunk_size: usize,
    /// Answer the next `GET_DATA` with a late `STOP` instead of streaming
    pub stale_stop: bool,
    /// Commands in the order they were received
    pub received: Vec<MessageType>,
    /// Data packages sent so far
    pub readings_sent: usize,
    max_exposure_us: u32,
    streaming: bool,
    last_status: ExposureStatus,
    inbox: BytesMut,
    outbox: VecDeque<u8>,
}

impl Default for FakeTorchBearer {
    fn default() -> Self {
        FakeTorchBearer {
            device_id: "Y21B7W10034-CZ".to_string(),
            range: WavelengthRange::new(380, 780).expect("valid range"),
            mode: ExposureMode::Manual,
            exposure_time_us: 100_000,
            serial: 0xCAFE_BABE,
            ex_info: 0x1122_3344_5566_7788,
            brightness: 0.5,
            chunk_size: 64,
            stale_stop: false,
            received: Vec::new(),
            readings_sent: 0,
            max_exposure_us: 5_000_000,
            streaming: false,
            last_status: ExposureStatus::Normal,
            inbox: BytesMut::new(),
            outbox: VecDeque::new(),
        }
    }
}

impl FakeTorchBearer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_brightness(mut self, brightness: f64) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn with_stale_stop(mut self) -> Self {
        self.stale_stop = true;
        self
    }

    /// Longest exposure time the device accepts, in µs
    pub fn with_max_exposure(mut self, max_exposure_us: u32) -> Self {
        self.max_exposure_us = max_exposure_us;
        self
    }

    /// Queues an arbitrary package, as if the device sent it unprompted
    pub fn push_response(&mut self, message_type: MessageType, payload: &[u8]) {
        let mut package = BytesMut::new();
        encode_frame(
            Direction::DeviceToHost,
            message_type.to_code(),
            payload,
            &mut package,
        )
        .expect("payload fits a package");
        self.outbox.extend(package.iter());
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Peak intensity at the current exposure time, before clipping
    pub fn expected_peak(&self) -> f64 {
        self.brightness * f64::from(self.exposure_time_us)
    }

    fn samples(&self) -> Vec<u16> {
        let len = self.range.len();
        let mid = (len / 2) as f64;
        (0..len)
            .map(|i| {
                // Triangle peaking in the middle of the range
                let shape = 1.0 - 0.8 * (i as f64 - mid).abs() / mid.max(1.0);
                (shape * self.expected_peak())
                    .round()
                    .min(f64::from(FULL_SCALE)) as u16
            })
            .collect()
    }

    fn push_reading(&mut self) {
        let values = self.samples();
        let peak = values.iter().copied().max().unwrap_or(0);
        let status = if peak == FULL_SCALE {
            ExposureStatus::Over
        } else if peak < FULL_SCALE / 100 {
            ExposureStatus::Under
        } else {
            ExposureStatus::Normal
        };
        let mut payload = vec![status as u8];
        payload.extend_from_slice(&self.exposure_time_us.to_le_bytes());
        payload.extend_from_slice(&encode_exponent(0).to_le_bytes());
        payload.extend_from_slice(&self.serial.to_le_bytes());
        payload.extend_from_slice(&self.ex_info.to_le_bytes());
        let words = scramble(
            &values,
            exposure_time_ms(self.exposure_time_us),
            self.serial,
            self.ex_info,
        );
        for word in words {
            payload.extend_from_slice(&word.to_le_bytes());
        }
        self.push_response(MessageType::GetData, &payload);
        self.last_status = status;
        self.readings_sent += 1;
    }

    fn handle(&mut self, message_type: MessageType, payload: &[u8]) {
        self.received.push(message_type);
        match message_type {
            MessageType::Stop => {
                self.streaming = false;
                // Firmware only acknowledges a stop after a normal reading
                if self.last_status == ExposureStatus::Normal {
                    self.push_response(MessageType::Stop, &[]);
                }
            }
            MessageType::GetDeviceId => {
                let id = self.device_id.clone();
                self.push_response(MessageType::GetDeviceId, id.as_bytes());
            }
            MessageType::SetExposureMode => {
                let accepted = match payload.first().map(|c| ExposureMode::try_from_code(*c)) {
                    Some(Ok(mode)) => {
                        self.mode = mode;
                        true
                    }
                    _ => false,
                };
                self.push_response(MessageType::SetExposureMode, &[u8::from(!accepted)]);
            }
            MessageType::GetExposureMode => {
                self.push_response(MessageType::GetExposureMode, &[self.mode.to_code()]);
            }
            MessageType::SetExposureValue => {
                let value = payload
                    .try_into()
                    .map(u32::from_le_bytes)
                    .ok()
                    .filter(|t| (1..=self.max_exposure_us).contains(t));
                if let Some(t) = value {
                    self.exposure_time_us = t;
                }
                self.push_response(MessageType::SetExposureValue, &[u8::from(value.is_none())]);
            }
            MessageType::GetExposureValue => {
                let t = self.exposure_time_us;
                self.push_response(MessageType::GetExposureValue, &t.to_le_bytes());
            }
            MessageType::GetRange => {
                let mut payload = self.range.start().to_le_bytes().to_vec();
                payload.extend_from_slice(&self.range.stop().to_le_bytes());
                self.push_response(MessageType::GetRange, &payload);
            }
            MessageType::GetData => {
                if self.stale_stop {
                    self.stale_stop = false;
                    self.push_response(MessageType::Stop, &[]);
                } else {
                    self.streaming = true;
                }
            }
        }
    }
}

impl Write for FakeTorchBearer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(buf);
        loop {
            match decode_frame(Direction::HostToDevice, &mut self.inbox) {
                Ok(Some(frame)) => match MessageType::try_from_code(frame.code) {
                    Ok(message_type) => self.handle(message_type, &frame.payload),
                    Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
                },
                Ok(None) => break,
                Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for FakeTorchBearer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbox.is_empty() && self.streaming {
            self.push_reading();
        }
        if self.outbox.is_empty() {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let count = buf.len().min(self.chunk_size).min(self.outbox.len());
        for (dst, src) in buf.iter_mut().zip(self.outbox.drain(..count)) {
            *dst = src;
        }
        Ok(count)
    }
}
