use crate::error::{Error, Result};
use core::{fmt, fmt::Display, str::FromStr};

/// Supported spectrometer families
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Backend {
    #[default]
    TorchBearer,
}

impl Backend {
    pub const ALL: &'static [Backend] = &[Backend::TorchBearer];

    pub fn name(self) -> &'static str {
        match self {
            Backend::TorchBearer => "torchbearer",
        }
    }

    /// Names accepted in a device string, in lower case
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Backend::TorchBearer => &["tb", "torchbearer", "torch_bearer"],
        }
    }

    /// Line rate of the device's serial link
    pub fn baud_rate(self) -> u32 {
        match self {
            Backend::TorchBearer => 115_200,
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.to_ascii_lowercase();
        Backend::ALL
            .iter()
            .copied()
            .find(|backend| backend.aliases().contains(&name.as_str()))
            .ok_or_else(|| Error::config(format!("unknown backend {:?}", s)))
    }
}

/// Device string, either `backend:path` or a bare `path` for the default backend
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DeviceSpec {
    pub backend: Backend,
    pub path: String,
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::config("empty device"));
        }
        // Anything that doesn't start with a known backend is a path, e.g. `COM3` or `C:\dev`
        if let Some((prefix, path)) = s.split_once(':') {
            if let Ok(backend) = prefix.parse::<Backend>() {
                if path.is_empty() {
                    return Err(Error::config(format!("missing path in {:?}", s)));
                }
                return Ok(DeviceSpec {
                    backend,
                    path: path.to_string(),
                });
            }
        }
        Ok(DeviceSpec {
            backend: Backend::default(),
            path: s.to_string(),
        })
    }
}

impl Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}:{}", self.backend, self.path))
    }
}
