mod std_io;

pub use std_io::StdIoAdapter;

use crate::{error::Result, session::Session};

/// Blocking byte transport a [`Session`] is driven over
pub trait IoAdapter {
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Reads whatever is available, `Ok(0)` means nothing arrived before the transport timed out
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn open_session(self) -> Session<Self>
    where
        Self: Sized,
    {
        Session::new(self)
    }
}
