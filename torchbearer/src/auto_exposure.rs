//! Software auto exposure.
//!
//! Device's own automatic mode tends to pick very long integration times. Instead the device is
//! kept in manual mode and integration time is searched for on the host: the brightest pixel
//! should sit around `target` fraction of full scale, while never crossing the saturation
//! threshold.

use crate::{
    error::{Error, Result},
    flags::ExposureStatus,
    io_adapter::IoAdapter,
    session::Session,
    spectrum::Spectrum,
};
use core::ops::RangeInclusive;

/// Fraction of full scale at which a pixel is considered saturated
pub const OVEREXPOSED_FRACTION: f64 = 0.98;
/// Probe is accepted once its peak is this close to the target, relative to the target
const ACCEPT_TOLERANCE: f64 = 0.15;
/// Proportional jump is only worth a measurement if it moves the time by more than this
const JUMP_THRESHOLD: f64 = 0.10;

pub const DEFAULT_TARGET: f64 = 0.9;
pub const DEFAULT_MAX_PROBES: usize = 8;
pub const DEFAULT_FULL_SCALE: f64 = 65535.0;
pub const DEFAULT_MIN_STEP_US: u32 = 1000;
pub const HARDWARE_LIMITS_US: RangeInclusive<u32> = 1..=5_000_000;

/// Anything auto exposure can judge
pub trait Exposure {
    /// Brightest active pixel
    fn peak(&self) -> f64;

    /// Whether the device itself flagged the reading as saturated
    fn reported_overexposed(&self) -> bool {
        false
    }
}

impl Exposure for Spectrum {
    fn peak(&self) -> f64 {
        Spectrum::peak(self).unwrap_or(0.0)
    }

    fn reported_overexposed(&self) -> bool {
        self.status == ExposureStatus::Over
    }
}

/// Something that can take a reading at a given integration time
pub trait Instrument {
    type Reading: Exposure;

    fn measure(&mut self, exposure_time_us: u32) -> Result<Self::Reading>;
}

impl<IO: IoAdapter> Instrument for Session<IO> {
    type Reading = Spectrum;

    /// Expects the device to already be in manual mode
    fn measure(&mut self, exposure_time_us: u32) -> Result<Spectrum> {
        if !self.set_exposure_time(exposure_time_us)? {
            return Err(Error::Refused("exposure time"));
        }
        self.acquire()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoExposureConfig {
    /// Soft lower bound in ms
    pub min_ms: Option<f64>,
    /// Soft upper bound in ms
    pub max_ms: Option<f64>,
    /// Desired peak as a fraction of full scale
    pub target: f64,
    /// Upper bound on measurements per search, the first one included
    pub max_probes: usize,
    /// Largest value a pixel can report
    pub full_scale: f64,
    /// Search stops once the bracket is this narrow
    pub min_step_us: u32,
    pub hardware_limits_us: RangeInclusive<u32>,
}

impl Default for AutoExposureConfig {
    fn default() -> Self {
        AutoExposureConfig {
            min_ms: None,
            max_ms: None,
            target: DEFAULT_TARGET,
            max_probes: DEFAULT_MAX_PROBES,
            full_scale: DEFAULT_FULL_SCALE,
            min_step_us: DEFAULT_MIN_STEP_US,
            hardware_limits_us: HARDWARE_LIMITS_US,
        }
    }
}

/// Outcome of a single search
#[derive(Debug, Clone, PartialEq)]
pub struct AutoExposure<R> {
    pub exposure_time_us: u32,
    /// Measurements taken
    pub probes: usize,
    /// Reading taken at `exposure_time_us`
    pub reading: R,
}

fn ms_to_us(ms: f64) -> u32 {
    (ms * 1000.0).round().clamp(0.0, f64::from(u32::MAX)) as u32
}

impl AutoExposureConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.target > 0.0 && self.target < OVEREXPOSED_FRACTION) {
            return Err(Error::config(format!(
                "target should be above 0 and below {}, got {}",
                OVEREXPOSED_FRACTION, self.target
            )));
        }
        if self.max_probes < 2 {
            return Err(Error::config("auto exposure needs at least 2 probes"));
        }
        if !(self.full_scale.is_finite() && self.full_scale > 0.0) {
            return Err(Error::config("full scale should be a positive number"));
        }
        let (lo, hi) = (
            *self.hardware_limits_us.start(),
            *self.hardware_limits_us.end(),
        );
        if lo == 0 || hi < lo {
            return Err(Error::config(format!(
                "invalid hardware exposure limits {}..={} µs",
                lo, hi
            )));
        }
        for bound in [self.min_ms, self.max_ms].into_iter().flatten() {
            if !(bound.is_finite() && bound > 0.0) {
                return Err(Error::config(format!(
                    "exposure bound should be a positive number of ms, got {}",
                    bound
                )));
            }
        }
        Ok(())
    }

    /// Soft bounds in µs, swapped if inverted and clamped into hardware limits
    pub fn bounds_us(&self) -> (u32, u32) {
        let (hw_lo, hw_hi) = (
            *self.hardware_limits_us.start(),
            *self.hardware_limits_us.end(),
        );
        let low = self.min_ms.map(ms_to_us).unwrap_or(hw_lo);
        let high = self.max_ms.map(ms_to_us).unwrap_or(hw_hi);
        let (low, high) = if high < low { (high, low) } else { (low, high) };
        (low.clamp(hw_lo, hw_hi), high.clamp(hw_lo, hw_hi))
    }

    fn overexposed<R: Exposure>(&self, reading: &R) -> bool {
        reading.reported_overexposed() || reading.peak() > self.full_scale * OVEREXPOSED_FRACTION
    }

    fn close_to_target(&self, peak: f64) -> bool {
        let target = self.target * self.full_scale;
        (peak - target).abs() <= target * ACCEPT_TOLERANCE
    }

    /// Time predicted to hit the target, if it is strictly inside the bracket and far enough
    /// from the probe to be worth measuring
    fn jump(&self, probe_us: u32, peak: f64, low: u32, high: u32) -> Option<u32> {
        if peak <= 0.0 || high <= low + 1 {
            return None;
        }
        let predicted = f64::from(probe_us) * self.target * self.full_scale / peak;
        let predicted = predicted.round().clamp(f64::from(low + 1), f64::from(high - 1)) as u32;
        let shift = (f64::from(predicted) - f64::from(probe_us)).abs();
        (shift > f64::from(probe_us) * JUMP_THRESHOLD).then_some(predicted)
    }

    /// Searches for an integration time, starting at `initial_us`
    pub fn run<I: Instrument>(
        &self,
        instrument: &mut I,
        initial_us: u32,
    ) -> Result<AutoExposure<I::Reading>> {
        self.validate()?;
        let (low, high) = self.bounds_us();
        let initial = initial_us.clamp(low, high);

        let reading = instrument.measure(initial)?;
        let mut probes = 1;
        if !self.overexposed(&reading) {
            log::debug!("Good exposure at {} µs", initial);
            return Ok(AutoExposure {
                exposure_time_us: initial,
                probes,
                reading,
            });
        }
        log::debug!("Over-exposed at {} µs", initial);
        if initial == low {
            return Ok(AutoExposure {
                exposure_time_us: low,
                probes,
                reading,
            });
        }

        let reading = instrument.measure(low)?;
        probes += 1;
        if self.overexposed(&reading) {
            log::debug!("Over-exposed even at {} µs", low);
            return Ok(AutoExposure {
                exposure_time_us: low,
                probes,
                reading,
            });
        }

        let (mut good, mut bad) = (low, initial);
        let peak = reading.peak();
        let mut best = AutoExposure {
            exposure_time_us: low,
            probes,
            reading,
        };
        if self.close_to_target(peak) {
            return Ok(best);
        }
        let mut next_jump = self.jump(low, peak, good, bad);

        while probes < self.max_probes && bad - good > self.min_step_us.max(1) {
            let probe = match next_jump.take() {
                Some(t) => t,
                None => {
                    let mean = (f64::from(good) * f64::from(bad)).sqrt().round() as u32;
                    mean.clamp(good + 1, bad - 1)
                }
            };
            let reading = instrument.measure(probe)?;
            probes += 1;
            best.probes = probes;

            if self.overexposed(&reading) {
                log::debug!("Over-exposed at {} µs", probe);
                bad = probe;
                continue;
            }
            let peak = reading.peak();
            log::debug!("Good exposure at {} µs, peak {:.1}", probe, peak);
            good = probe;
            best.exposure_time_us = probe;
            best.reading = reading;
            if self.close_to_target(peak) {
                break;
            }
            next_jump = self.jump(probe, peak, good, bad);
        }

        log::debug!(
            "Final exposure at {} µs after {} probes",
            best.exposure_time_us,
            best.probes
        );
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;

    /// Linear sensor: peak grows with time until it clips at full scale
    struct LinearSensor {
        counts_per_us: f64,
        measured: Vec<u32>,
    }

    struct Reading(f64);

    impl Exposure for Reading {
        fn peak(&self) -> f64 {
            self.0
        }
    }

    impl Instrument for LinearSensor {
        type Reading = Reading;

        fn measure(&mut self, exposure_time_us: u32) -> Result<Reading> {
            self.measured.push(exposure_time_us);
            Ok(Reading(
                (f64::from(exposure_time_us) * self.counts_per_us).min(DEFAULT_FULL_SCALE),
            ))
        }
    }

    fn sensor(counts_per_us: f64) -> LinearSensor {
        LinearSensor {
            counts_per_us,
            measured: Vec::new(),
        }
    }

    #[test]
    fn accept_initial_when_not_overexposed() {
        let config = AutoExposureConfig::default();
        let mut dim = sensor(0.01);
        let result = config.run(&mut dim, 100_000).unwrap();
        assert_eq!(result.exposure_time_us, 100_000);
        assert_eq!(result.probes, 1);
        assert_eq!(dim.measured, vec![100_000]);
    }

    #[test]
    fn overexposed_minimum_stops_search() {
        let config = AutoExposureConfig {
            min_ms: Some(1.0),
            ..Default::default()
        };
        let mut blinding = sensor(1000.0);
        let result = config.run(&mut blinding, 500_000).unwrap();
        assert_eq!(result.exposure_time_us, 1000);
        assert_eq!(result.probes, 2);
        assert_eq!(blinding.measured, vec![500_000, 1000]);
    }

    #[test]
    fn converges_to_target() {
        let config = AutoExposureConfig {
            min_ms: Some(1.0),
            max_ms: Some(1000.0),
            ..Default::default()
        };
        // Target of 0.9 is hit at roughly 29.5 ms
        let mut bright = sensor(2.0);
        let result = config.run(&mut bright, 1_000_000).unwrap();
        let target = config.target * config.full_scale;
        assert!((result.reading.peak() - target).abs() <= target * ACCEPT_TOLERANCE);
        assert!(result.reading.peak() < config.full_scale * OVEREXPOSED_FRACTION);
        assert!(result.probes <= config.max_probes);
        assert_eq!(result.probes, bright.measured.len());
        assert_eq!(bright.measured.last(), Some(&result.exposure_time_us));
    }

    #[test]
    fn respects_probe_budget() {
        let config = AutoExposureConfig {
            max_probes: 3,
            min_step_us: 1,
            target: 0.5,
            ..Default::default()
        };
        let mut bright = sensor(0.5);
        let result = config.run(&mut bright, 5_000_000).unwrap();
        assert_eq!(bright.measured.len(), 3);
        assert_eq!(result.probes, 3);
        assert!(result.reading.peak() < config.full_scale * OVEREXPOSED_FRACTION);
    }

    #[test]
    fn device_flag_counts_as_overexposed() {
        struct Flagged;
        impl Exposure for Flagged {
            fn peak(&self) -> f64 {
                10.0
            }
            fn reported_overexposed(&self) -> bool {
                true
            }
        }
        struct AlwaysOver;
        impl Instrument for AlwaysOver {
            type Reading = Flagged;
            fn measure(&mut self, _: u32) -> Result<Flagged> {
                Ok(Flagged)
            }
        }
        let config = AutoExposureConfig {
            min_ms: Some(2.0),
            ..Default::default()
        };
        let result = config.run(&mut AlwaysOver, 50_000).unwrap();
        assert_eq!(result.exposure_time_us, 2000);
    }

    #[test]
    fn soft_bounds() {
        let swapped = AutoExposureConfig {
            min_ms: Some(200.0),
            max_ms: Some(10.0),
            ..Default::default()
        };
        assert_eq!(swapped.bounds_us(), (10_000, 200_000));

        let clamped = AutoExposureConfig {
            min_ms: Some(0.0001),
            max_ms: Some(60_000.0),
            hardware_limits_us: 10..=1_000_000,
            ..Default::default()
        };
        assert_eq!(clamped.bounds_us(), (10, 1_000_000));
        assert_eq!(AutoExposureConfig::default().bounds_us(), (1, 5_000_000));
    }

    #[test]
    fn initial_time_is_clamped() {
        let config = AutoExposureConfig {
            min_ms: Some(5.0),
            max_ms: Some(50.0),
            ..Default::default()
        };
        let mut dim = sensor(0.001);
        let result = config.run(&mut dim, 4_000_000).unwrap();
        assert_eq!(result.exposure_time_us, 50_000);
    }

    #[test]
    fn reject_invalid_config() {
        let config = |f: fn(&mut AutoExposureConfig)| {
            let mut config = AutoExposureConfig::default();
            f(&mut config);
            config.validate()
        };
        assert_ok!(config(|_| ()));
        assert_err!(config(|c| c.target = 0.0));
        assert_err!(config(|c| c.target = 0.99));
        assert_err!(config(|c| c.max_probes = 1));
        assert_err!(config(|c| c.full_scale = -1.0));
        assert_err!(config(|c| c.min_ms = Some(f64::NAN)));
        assert_err!(config(|c| c.hardware_limits_us = 0..=10));
        assert_matches!(
            config(|c| c.max_probes = 0),
            Err(Error::InvalidConfig(_))
        );
    }
}
