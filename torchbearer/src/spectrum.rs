use crate::{
    error::{Error, Result},
    flags::{ExposureMode, ExposureStatus},
    response::SpectralData,
};
use core::{fmt, fmt::Display, ops::RangeInclusive};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Units of decoded intensities
pub const IRRADIANCE_UNITS: &str = "W/(m²·nm)";

/// Spectral range of the device in nm, both ends included
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct WavelengthRange {
    start: u16,
    stop: u16,
}

impl WavelengthRange {
    pub fn new(start: u16, stop: u16) -> Result<Self> {
        if stop < start {
            return Err(Error::InvalidData("wavelength range ends before it starts"));
        }
        Ok(WavelengthRange { start, stop })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn stop(&self) -> u16 {
        self.stop
    }

    /// Amount of whole nanometers covered
    pub fn len(&self) -> usize {
        usize::from(self.stop - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> RangeInclusive<u16> {
        self.start..=self.stop
    }
}

impl Display for WavelengthRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}-{} nm", self.start, self.stop))
    }
}

/// Facts about a connected device
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct BasicInfo {
    pub device_id: String,
    pub wavelength_range: WavelengthRange,
    pub exposure_mode: ExposureMode,
    pub exposure_time_us: u32,
}

impl Display for BasicInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            concat!(
                "Device id: {}\n",
                "Wavelength range: {}\n",
                "Exposure mode: {}\n",
                "Exposure time: {} µs",
            ),
            self.device_id, self.wavelength_range, self.exposure_mode, self.exposure_time_us
        ))
    }
}

/// Single decoded reading
#[derive(PartialEq, Debug, Clone)]
pub struct Spectrum {
    pub status: ExposureStatus,
    pub exposure: ExposureMode,
    /// Integration time in milliseconds
    pub time_ms: f64,
    /// Intensity per whole nanometer
    pub spd: BTreeMap<u16, f64>,
    pub wavelength_range: WavelengthRange,
    pub wavelengths_raw: Vec<f64>,
    pub spd_raw: Vec<f64>,
    pub timestamp: OffsetDateTime,
    pub name: Option<String>,
    pub y_axis: String,
    pub device: Option<String>,
}

impl Spectrum {
    /// Pairs decoded samples with wavelengths, first sample belongs to the start of the range
    pub fn from_reading(
        data: SpectralData,
        exposure: ExposureMode,
        wavelength_range: WavelengthRange,
        device: Option<String>,
    ) -> Self {
        let spd = wavelength_range
            .iter()
            .zip(data.spectrum.iter().copied())
            .collect();
        Spectrum {
            status: data.status,
            exposure,
            time_ms: f64::from(data.exposure_time_us) / 1000.0,
            spd,
            wavelength_range,
            wavelengths_raw: wavelength_range.iter().map(f64::from).collect(),
            spd_raw: data.spectrum,
            timestamp: OffsetDateTime::now_utc(),
            name: None,
            y_axis: IRRADIANCE_UNITS.to_string(),
            device,
        }
    }

    /// Brightest raw intensity, `None` for an empty reading
    pub fn peak(&self) -> Option<f64> {
        self.spd_raw.iter().copied().reduce(f64::max)
    }

    pub fn exposure_time_us(&self) -> u32 {
        (self.time_ms * 1000.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;

    fn reading(samples: Vec<f64>) -> SpectralData {
        SpectralData {
            status: ExposureStatus::Normal,
            exposure_time_us: 12_500,
            encoded_exponent: 0,
            serial: 1,
            ex_info: 2,
            spectrum: samples,
        }
    }

    #[test]
    fn wavelength_range_bounds() {
        let range = WavelengthRange::new(380, 780).unwrap();
        assert_eq!(range.len(), 401);
        assert_eq!(range.to_string(), "380-780 nm");
        assert_ok!(WavelengthRange::new(500, 500));
        assert_err!(WavelengthRange::new(781, 780));
    }

    #[test]
    fn spectrum_from_reading() {
        let range = WavelengthRange::new(400, 403).unwrap();
        let spectrum = Spectrum::from_reading(
            reading(vec![1.0, 4.0, 2.0, 3.0]),
            ExposureMode::Manual,
            range,
            Some("Y21B7W".to_string()),
        );
        assert_eq!(spectrum.time_ms, 12.5);
        assert_eq!(spectrum.exposure_time_us(), 12_500);
        assert_eq!(spectrum.wavelengths_raw, vec![400.0, 401.0, 402.0, 403.0]);
        assert_eq!(spectrum.spd.get(&401), Some(&4.0));
        assert_eq!(spectrum.spd.len(), 4);
        assert_eq!(spectrum.peak(), Some(4.0));
        assert_eq!(spectrum.y_axis, IRRADIANCE_UNITS);
    }

    #[test]
    fn short_reading_keeps_samples() {
        let range = WavelengthRange::new(400, 410).unwrap();
        let spectrum =
            Spectrum::from_reading(reading(vec![1.0, 2.0]), ExposureMode::Manual, range, None);
        assert_eq!(spectrum.spd.len(), 2);
        assert_eq!(spectrum.spd_raw.len(), 2);
        assert_eq!(spectrum.wavelengths_raw.len(), 11);
    }
}
