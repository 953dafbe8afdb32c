use super::IoAdapter;
use crate::error::Result;
use std::io::{self, Read, Write};

/// Adapts anything implementing [`Read`] and [`Write`], e.g. a serial port
pub struct StdIoAdapter<IO: Read + Write> {
    io: IO,
}

impl<IO: Read + Write> IoAdapter for StdIoAdapter<IO> {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.io.write_all(buf)?;
        self.io.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.io.read(buf) {
            Ok(count) => Ok(count),
            // Serial ports report an expired poll as an error
            Err(err) if matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl<IO: Read + Write> StdIoAdapter<IO> {
    pub fn new(io: IO) -> Self {
        StdIoAdapter { io }
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}
