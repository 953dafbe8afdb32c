use clap::Args;
use serialport::SerialPort;
use simple_eyre::{eyre::eyre, Result};
use std::time::Duration;
use torchbearer::{Backend, DeviceSpec, IoAdapter, Session, StdIoAdapter};

// Short poll, session keeps reading until a package is complete
const READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Args)]
pub struct DeviceConf {
    /// Device as `backend:path`, or just a serial port path
    #[clap(value_parser)]
    pub device: DeviceSpec,
}

pub type SerialSession = Session<StdIoAdapter<Box<dyn SerialPort>>>;

impl DeviceConf {
    pub fn open_session(&self) -> Result<SerialSession> {
        let DeviceSpec { backend, path } = &self.device;
        log::debug!("Opening {} at {}", backend, path);
        match backend {
            Backend::TorchBearer => {
                let port = serialport::new(path, backend.baud_rate())
                    .timeout(READ_TIMEOUT)
                    .open()
                    .map_err(|err| eyre!("Could not open serial port {}: {}", path, err))?;
                Ok(StdIoAdapter::new(port).open_session())
            }
        }
    }
}
