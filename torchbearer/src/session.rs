use crate::{
    codec::{decoder::Decoder, encoder::Encoder, FrameCodec},
    command::Command,
    error::{Error, Result},
    flags::{ExposureMode, ExposureStatus},
    io_adapter::IoAdapter,
    response::{ModeAck, Response},
    spectrum::{BasicInfo, Spectrum, WavelengthRange},
};
use bytes::BytesMut;
use scopeguard::{guard, ScopeGuard};

// A single data package of a 401 px device fits into one read
const READ_CHUNK_SIZE: usize = 1024;

fn mismatch(cmd: Command, resp: &Response) -> Error {
    Error::UnexpectedResponse {
        expected: cmd.message_type(),
        actual: resp.message_type(),
    }
}

/// Facts about the device learned while talking to it
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionFacts {
    pub device_id: Option<String>,
    pub wavelength_range: Option<WavelengthRange>,
    pub exposure_mode: Option<ExposureMode>,
    pub exposure_time_us: Option<u32>,
}

/// Connection to a single spectrometer.
///
/// Owns the transport and the receive buffer. A framing error leaves the buffer in an unknown
/// state, session has to be recreated after one.
pub struct Session<IO: IoAdapter> {
    io: IO,
    codec: FrameCodec,
    buf: BytesMut,
    facts: SessionFacts,
    closed: bool,
}

impl<IO: IoAdapter> Session<IO> {
    pub fn new(io: IO) -> Self {
        Session {
            io,
            codec: FrameCodec,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            facts: SessionFacts::default(),
            closed: false,
        }
    }

    pub fn facts(&self) -> &SessionFacts {
        &self.facts
    }

    /// Model part of the device id, e.g. `Y21B7W10034` for `Y21B7W10034-CZ`
    pub fn device_name(&self) -> Option<&str> {
        self.facts
            .device_id
            .as_deref()
            .and_then(|id| id.split('-').next())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn send(&mut self, cmd: Command) -> Result<()> {
        self.ensure_open()?;
        let mut package = BytesMut::new();
        self.codec.encode(cmd, &mut package)?;
        log::debug!("Sending {}", cmd.message_type());
        self.io.write_all(&package)
    }

    fn receive(&mut self) -> Result<Response> {
        self.ensure_open()?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(resp) = self.codec.decode(&mut self.buf)? {
                log::debug!("Received {}", resp.message_type());
                return Ok(resp);
            }
            let count = self.io.read(&mut chunk)?;
            self.buf.extend_from_slice(&chunk[..count]);
        }
    }

    /// Sends `cmd` and waits for a response of the same type
    pub fn query(&mut self, cmd: Command) -> Result<Response> {
        self.send(cmd)?;
        let resp = self.receive()?;
        let expected = cmd.message_type();
        let actual = resp.message_type();
        if expected != actual {
            return Err(Error::UnexpectedResponse { expected, actual });
        }
        Ok(resp)
    }

    pub fn device_id(&mut self) -> Result<String> {
        match self.query(Command::GetDeviceId)? {
            Response::DeviceId(id) => {
                self.facts.device_id = Some(id.clone());
                Ok(id)
            }
            other => Err(mismatch(Command::GetDeviceId, &other)),
        }
    }

    pub fn wavelength_range(&mut self) -> Result<WavelengthRange> {
        match self.query(Command::GetRange)? {
            Response::Range(range) => {
                self.facts.wavelength_range = Some(range);
                Ok(range)
            }
            other => Err(mismatch(Command::GetRange, &other)),
        }
    }

    pub fn exposure_mode(&mut self) -> Result<ExposureMode> {
        match self.query(Command::GetExposureMode)? {
            Response::ExposureMode(mode) => {
                self.facts.exposure_mode = Some(mode);
                Ok(mode)
            }
            other => Err(mismatch(Command::GetExposureMode, &other)),
        }
    }

    /// Returns whether the device accepted the new mode
    pub fn set_exposure_mode(&mut self, mode: ExposureMode) -> Result<bool> {
        let success = match self.query(Command::SetExposureMode(mode))? {
            Response::SetExposureMode(ModeAck::Success(success)) => success,
            Response::SetExposureMode(ModeAck::Mode(echoed)) => echoed == mode,
            other => return Err(mismatch(Command::SetExposureMode(mode), &other)),
        };
        if success {
            self.facts.exposure_mode = Some(mode);
        } else {
            log::warn!("Device refused exposure mode {}", mode);
        }
        Ok(success)
    }

    /// Current integration time in µs
    pub fn exposure_time(&mut self) -> Result<u32> {
        match self.query(Command::GetExposureValue)? {
            Response::ExposureValue(t) => {
                self.facts.exposure_time_us = Some(t);
                Ok(t)
            }
            other => Err(mismatch(Command::GetExposureValue, &other)),
        }
    }

    /// Returns whether the device accepted the new integration time
    pub fn set_exposure_time(&mut self, exposure_time_us: u32) -> Result<bool> {
        let success = match self.query(Command::SetExposureValue(exposure_time_us))? {
            Response::SetExposureValue(success) => success,
            other => return Err(mismatch(Command::SetExposureValue(exposure_time_us), &other)),
        };
        if success {
            self.facts.exposure_time_us = Some(exposure_time_us);
        } else {
            log::warn!("Device refused exposure time of {} µs", exposure_time_us);
        }
        Ok(success)
    }

    /// Remembers the time auto exposure settled on, without talking to the device
    pub fn record_exposure_time(&mut self, exposure_time_us: u32) {
        self.facts.exposure_time_us = Some(exposure_time_us);
    }

    pub fn basic_info(&mut self) -> Result<BasicInfo> {
        Ok(BasicInfo {
            device_id: self.device_id()?,
            wavelength_range: self.wavelength_range()?,
            exposure_mode: self.exposure_mode()?,
            exposure_time_us: self.exposure_time()?,
        })
    }

    /// Streams readings into `callback` until it returns `false`.
    ///
    /// Wavelength range and exposure mode are queried first unless already known.
    pub fn stream<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(Spectrum) -> bool,
    {
        let range = match self.facts.wavelength_range {
            Some(range) => range,
            None => self.wavelength_range()?,
        };
        let mode = match self.facts.exposure_mode {
            Some(mode) => mode,
            None => self.exposure_mode()?,
        };
        let device = self.device_name().map(str::to_string);

        self.send(Command::GetData)?;
        // Device keeps streaming until told otherwise, even if we bail out early
        let mut session = guard(self, |s| {
            if let Err(err) = s.send(Command::Stop) {
                log::warn!("Failed to stop streaming: {}", err);
            }
        });

        let last_status = loop {
            match session.receive()? {
                Response::Data(data) => {
                    let status = data.status;
                    let spectrum = Spectrum::from_reading(data, mode, range, device.clone());
                    if !callback(spectrum) {
                        break status;
                    }
                }
                Response::Stop => {
                    // Late acknowledgement of a previous stream, device dropped our request
                    log::info!("Stale stop while streaming, requesting data again");
                    session.send(Command::GetData)?;
                }
                other => log::info!("Ignoring {} while streaming", other.message_type()),
            }
        };

        ScopeGuard::into_inner(session).finish_stream(last_status)
    }

    fn finish_stream(&mut self, last_status: ExposureStatus) -> Result<()> {
        self.send(Command::Stop)?;
        if !last_status.is_normal() {
            // Device doesn't acknowledge a stop after an abnormal reading
            log::debug!("Last reading was {}, not waiting for stop", last_status);
            return Ok(());
        }
        loop {
            match self.receive()? {
                Response::Stop => return Ok(()),
                other => log::trace!("Dropping {} while stopping", other.message_type()),
            }
        }
    }

    /// Takes a single reading
    pub fn acquire(&mut self) -> Result<Spectrum> {
        let mut reading = None;
        self.stream(|spectrum| {
            reading = Some(spectrum);
            false
        })?;
        reading.ok_or(Error::InvalidData("stream ended without a reading"))
    }

    /// Streams until a reading with normal exposure arrives, or `max_attempts` readings were
    /// taken. In the latter case the last reading is returned as is.
    pub fn acquire_normal(&mut self, max_attempts: usize) -> Result<Spectrum> {
        if max_attempts == 0 {
            return Err(Error::config("at least one attempt is required"));
        }
        let mut attempts = 0;
        let mut reading = None;
        self.stream(|spectrum| {
            attempts += 1;
            let done = spectrum.status.is_normal() || attempts >= max_attempts;
            if !spectrum.status.is_normal() {
                log::debug!("Reading {} is {}", attempts, spectrum.status);
            }
            reading = Some(spectrum);
            !done
        })?;
        reading.ok_or(Error::InvalidData("stream ended without a reading"))
    }

    /// Stops the device and forgets everything learned about it. Any later exchange fails
    /// with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let stopped = self.send(Command::Stop);
        self.closed = true;
        self.buf.clear();
        self.facts = SessionFacts::default();
        stopped
    }

    /// Gives the transport back
    pub fn into_inner(self) -> IO {
        self.io
    }
}
