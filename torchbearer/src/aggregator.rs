use crate::{
    error::{Error, Result},
    spectrum::Spectrum,
};
use core::{fmt, fmt::Display, str::FromStr};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Maximum of values seen during the last `window` seconds
#[derive(Debug, Clone)]
pub struct SlidingMax {
    window: Duration,
    // Timestamps increase front to back, values strictly decrease
    entries: VecDeque<(Instant, f64)>,
}

fn window_duration(seconds: f64) -> Result<Duration> {
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(Error::config(format!(
            "sliding window should be a positive number of seconds, got {}",
            seconds
        )));
    }
    Ok(Duration::from_secs_f64(seconds))
}

impl SlidingMax {
    pub fn new(window_seconds: f64) -> Result<Self> {
        Ok(SlidingMax {
            window: window_duration(window_seconds)?,
            entries: VecDeque::new(),
        })
    }

    pub fn window_size(&self) -> f64 {
        self.window.as_secs_f64()
    }

    pub fn add(&mut self, value: f64) -> Option<f64> {
        self.add_at(Instant::now(), value)
    }

    /// Same as [`SlidingMax::add`] with an explicit timestamp, which must not go back in time
    pub fn add_at(&mut self, now: Instant, value: f64) -> Option<f64> {
        self.expire(now);
        if !value.is_nan() {
            while matches!(self.entries.back(), Some((_, last)) if *last <= value) {
                self.entries.pop_back();
            }
            self.entries.push_back((now, value));
        }
        self.current()
    }

    pub fn current(&self) -> Option<f64> {
        self.entries.front().map(|(_, value)| *value)
    }

    pub fn set_window_size(&mut self, window_seconds: f64) -> Result<()> {
        self.set_window_size_at(Instant::now(), window_seconds)
    }

    pub fn set_window_size_at(&mut self, now: Instant, window_seconds: f64) -> Result<()> {
        self.window = window_duration(window_seconds)?;
        self.expire(now);
        Ok(())
    }

    fn expire(&mut self, now: Instant) {
        while let Some((t, _)) = self.entries.front() {
            if now.saturating_duration_since(*t) >= self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum AggregateFunc {
    #[default]
    Avg,
    Max,
}

impl Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregateFunc::Avg => "avg",
            AggregateFunc::Max => "max",
        })
    }
}

impl FromStr for AggregateFunc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "avg" => Ok(AggregateFunc::Avg),
            "max" => Ok(AggregateFunc::Max),
            _ => Err(Error::config(format!(
                "unknown aggregate function {:?}, expected avg or max",
                s
            ))),
        }
    }
}

/// Last N arrays of one field and their element-wise aggregate
#[derive(Debug, Clone, Default)]
struct FieldWindow {
    arrays: VecDeque<Vec<f64>>,
    // Sequence number of `arrays.front()`
    first_seq: u64,
    sums: Vec<f64>,
    // Per position monotonic deque of (sequence number, value)
    maxes: Vec<VecDeque<(u64, f64)>>,
}

impl FieldWindow {
    fn width(&self) -> Option<usize> {
        self.arrays.front().map(Vec::len)
    }

    fn clear(&mut self) {
        self.arrays.clear();
        self.sums.clear();
        self.maxes.clear();
    }

    fn width_changes(&self, len: usize) -> bool {
        self.width().map_or(false, |width| width != len)
    }

    fn restart(&mut self) {
        self.first_seq += self.arrays.len() as u64;
        self.clear();
    }

    fn push(&mut self, func: AggregateFunc, values: Vec<f64>) {
        let seq = self.first_seq + self.arrays.len() as u64;
        match func {
            AggregateFunc::Avg => {
                self.sums.resize(values.len(), 0.0);
                for (sum, value) in self.sums.iter_mut().zip(&values) {
                    *sum += value;
                }
            }
            AggregateFunc::Max => {
                self.maxes.resize_with(values.len(), VecDeque::new);
                for (deque, value) in self.maxes.iter_mut().zip(&values) {
                    while matches!(deque.back(), Some((_, last)) if last <= value) {
                        deque.pop_back();
                    }
                    deque.push_back((seq, *value));
                }
            }
        }
        self.arrays.push_back(values);
    }

    fn evict_oldest(&mut self, func: AggregateFunc) {
        let Some(oldest) = self.arrays.pop_front() else {
            return;
        };
        let seq = self.first_seq;
        self.first_seq += 1;
        match func {
            AggregateFunc::Avg => {
                for (sum, value) in self.sums.iter_mut().zip(&oldest) {
                    *sum -= value;
                }
            }
            AggregateFunc::Max => {
                for deque in self.maxes.iter_mut() {
                    if matches!(deque.front(), Some((front, _)) if *front == seq) {
                        deque.pop_front();
                    }
                }
            }
        }
    }

    fn rebuild(&mut self, func: AggregateFunc) {
        let arrays: Vec<Vec<f64>> = self.arrays.drain(..).collect();
        self.first_seq = 0;
        self.clear();
        for values in arrays {
            self.push(func, values);
        }
    }

    fn aggregate(&self, func: AggregateFunc) -> Vec<f64> {
        match func {
            AggregateFunc::Avg => {
                let count = self.arrays.len() as f64;
                self.sums.iter().map(|sum| sum / count).collect()
            }
            AggregateFunc::Max => self
                .maxes
                .iter()
                .map(|deque| deque.front().map_or(f64::NAN, |(_, value)| *value))
                .collect(),
        }
    }
}

/// Element-wise average or maximum over the last `window_size` spectra
#[derive(Debug, Clone)]
pub struct SpectrumAggregator {
    func: AggregateFunc,
    window_size: usize,
    spd: FieldWindow,
    spd_raw: FieldWindow,
}

impl SpectrumAggregator {
    pub fn new(func: AggregateFunc, window_size: usize) -> Result<Self> {
        check_window_size(window_size)?;
        Ok(SpectrumAggregator {
            func,
            window_size,
            spd: FieldWindow::default(),
            spd_raw: FieldWindow::default(),
        })
    }

    pub fn func(&self) -> AggregateFunc {
        self.func
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Amount of buffered spectra
    pub fn len(&self) -> usize {
        self.spd_raw.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_func(&mut self, func: AggregateFunc) {
        if func != self.func {
            self.func = func;
            self.spd.rebuild(func);
            self.spd_raw.rebuild(func);
        }
    }

    /// Resizes the window, dropping the oldest spectra that no longer fit
    pub fn set_window_size(&mut self, window_size: usize) -> Result<()> {
        check_window_size(window_size)?;
        self.window_size = window_size;
        while self.len() > window_size {
            self.spd.evict_oldest(self.func);
            self.spd_raw.evict_oldest(self.func);
        }
        // Running sums drift with every eviction
        self.spd.rebuild(self.func);
        self.spd_raw.rebuild(self.func);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.spd.clear();
        self.spd_raw.clear();
    }

    /// Buffers `spectrum` and returns a copy of it with aggregated intensities
    pub fn add(&mut self, spectrum: Spectrum) -> Spectrum {
        let spd_values: Vec<f64> = spectrum.spd.values().copied().collect();
        // Both fields share one window, a width change in either restarts both
        if self.spd.width_changes(spd_values.len())
            || self.spd_raw.width_changes(spectrum.spd_raw.len())
        {
            log::debug!("Sample count changed, restarting aggregation");
            self.spd.restart();
            self.spd_raw.restart();
        } else if self.len() == self.window_size {
            self.spd.evict_oldest(self.func);
            self.spd_raw.evict_oldest(self.func);
        }
        self.spd.push(self.func, spd_values);
        self.spd_raw.push(self.func, spectrum.spd_raw.clone());

        let spd_values = self.spd.aggregate(self.func);
        let spd = spectrum.spd.keys().copied().zip(spd_values).collect();
        Spectrum {
            spd,
            spd_raw: self.spd_raw.aggregate(self.func),
            y_axis: format!(
                "{} [{} {}/{}]",
                spectrum.y_axis,
                self.func,
                self.len(),
                self.window_size
            ),
            ..spectrum
        }
    }
}

fn check_window_size(window_size: usize) -> Result<()> {
    if window_size == 0 {
        return Err(Error::config("aggregation window should hold at least 1 spectrum"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        flags::{ExposureMode, ExposureStatus},
        response::SpectralData,
        spectrum::{WavelengthRange, IRRADIANCE_UNITS},
    };
    use claims::*;

    fn spectrum(values: &[f64]) -> Spectrum {
        let range = WavelengthRange::new(400, 400 + values.len() as u16 - 1).unwrap();
        Spectrum::from_reading(
            SpectralData {
                status: ExposureStatus::Normal,
                exposure_time_us: 1000,
                encoded_exponent: 0,
                serial: 0,
                ex_info: 0,
                spectrum: values.to_vec(),
            },
            ExposureMode::Manual,
            range,
            None,
        )
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn sliding_max_window() {
        let start = Instant::now();
        let at = |secs: u64| start + Duration::from_secs(secs);
        let mut peak = SlidingMax::new(10.0).unwrap();
        assert_eq!(peak.current(), None);
        assert_eq!(peak.add_at(at(0), 5.0), Some(5.0));
        assert_eq!(peak.add_at(at(1), 3.0), Some(5.0));
        assert_eq!(peak.add_at(at(2), 4.0), Some(5.0));
        // 5.0 ages out, 4.0 took over 3.0
        assert_eq!(peak.add_at(at(11), 1.0), Some(4.0));
        // Exactly one window old counts as expired
        assert_eq!(peak.add_at(at(12), 2.0), Some(2.0));
        // Everything ages out, only the new value remains
        assert_eq!(peak.add_at(at(40), 0.5), Some(0.5));
    }

    #[test]
    fn sliding_max_expires_at_window_edge() {
        let start = Instant::now();
        let mut peak = SlidingMax::new(10.0).unwrap();
        peak.add_at(start, 10.0);
        assert_eq!(peak.add_at(start + Duration::from_secs(10), 5.0), Some(5.0));
        assert_ok!(peak.set_window_size_at(start + Duration::from_secs(12), 2.0));
        assert_eq!(peak.current(), None);
    }

    #[test]
    fn sliding_max_resize() {
        let start = Instant::now();
        let at = |secs: u64| start + Duration::from_secs(secs);
        let mut peak = SlidingMax::new(30.0).unwrap();
        peak.add_at(at(0), 9.0);
        peak.add_at(at(20), 1.0);
        assert_eq!(peak.current(), Some(9.0));
        assert_ok!(peak.set_window_size_at(at(25), 10.0));
        assert_eq!(peak.current(), Some(1.0));
        assert_eq!(peak.window_size(), 10.0);
        assert_err!(peak.set_window_size(0.0));
        assert_err!(SlidingMax::new(-1.0));
    }

    #[test]
    fn sliding_max_ignores_nan() {
        let mut peak = SlidingMax::new(1.0).unwrap();
        assert_eq!(peak.add(f64::NAN), None);
        assert_eq!(peak.add(2.0), Some(2.0));
    }

    #[test]
    fn average_of_last_spectra() {
        let mut agg = SpectrumAggregator::new(AggregateFunc::Avg, 2).unwrap();
        let first = agg.add(spectrum(&[1.0, 2.0, 3.0]));
        assert_close(&first.spd_raw, &[1.0, 2.0, 3.0]);
        assert_eq!(first.y_axis, format!("{} [avg 1/2]", IRRADIANCE_UNITS));

        let second = agg.add(spectrum(&[3.0, 4.0, 5.0]));
        assert_close(&second.spd_raw, &[2.0, 3.0, 4.0]);
        assert_eq!(second.spd.get(&401), Some(&3.0));

        let third = agg.add(spectrum(&[5.0, 0.0, 1.0]));
        assert_close(&third.spd_raw, &[4.0, 2.0, 3.0]);
        assert_close(
            &third.spd.values().copied().collect::<Vec<_>>(),
            &[4.0, 2.0, 3.0],
        );
        assert_eq!(third.y_axis, format!("{} [avg 2/2]", IRRADIANCE_UNITS));
        assert_eq!(third.wavelengths_raw, vec![400.0, 401.0, 402.0]);
    }

    #[test]
    fn maximum_of_last_spectra() {
        let mut agg = SpectrumAggregator::new(AggregateFunc::Max, 3).unwrap();
        let inputs = [
            [9.0, 1.0],
            [2.0, 5.0],
            [3.0, 4.0],
            [1.0, 1.0],
            [0.0, 0.0],
            [0.0, 0.0],
        ];
        let expected = [
            [9.0, 1.0],
            [9.0, 5.0],
            [9.0, 5.0],
            [3.0, 5.0],
            [3.0, 4.0],
            [1.0, 1.0],
        ];
        for (input, expected) in inputs.iter().zip(expected.iter()) {
            let out = agg.add(spectrum(input));
            assert_eq!(&out.spd_raw, expected);
        }
    }

    #[test]
    fn shrinking_window_evicts_oldest() {
        let mut agg = SpectrumAggregator::new(AggregateFunc::Avg, 4).unwrap();
        for value in [1.0, 2.0, 3.0, 4.0] {
            agg.add(spectrum(&[value]));
        }
        assert_ok!(agg.set_window_size(2));
        assert_eq!(agg.len(), 2);
        let out = agg.add(spectrum(&[6.0]));
        // 3.0 was evicted to make room for 6.0
        assert_close(&out.spd_raw, &[5.0]);
        assert_err!(agg.set_window_size(0));
    }

    #[test]
    fn switching_function_rebuilds() {
        let mut agg = SpectrumAggregator::new(AggregateFunc::Avg, 3).unwrap();
        agg.add(spectrum(&[1.0]));
        agg.add(spectrum(&[7.0]));
        agg.set_func(AggregateFunc::Max);
        let out = agg.add(spectrum(&[2.0]));
        assert_eq!(out.spd_raw, vec![7.0]);
        assert_eq!(out.y_axis, format!("{} [max 3/3]", IRRADIANCE_UNITS));

        agg.set_func(AggregateFunc::Avg);
        let out = agg.add(spectrum(&[6.0]));
        assert_close(&out.spd_raw, &[5.0]);
    }

    #[test]
    fn clear_and_width_change() {
        let mut agg = SpectrumAggregator::new(AggregateFunc::Max, 5).unwrap();
        agg.add(spectrum(&[10.0, 10.0]));
        let out = agg.add(spectrum(&[1.0, 2.0, 3.0]));
        assert_eq!(out.spd_raw, vec![1.0, 2.0, 3.0]);
        assert_eq!(agg.len(), 1);
        agg.clear();
        assert!(agg.is_empty());
    }

    #[test]
    fn fields_restart_together() {
        // Range shorter than the samples, spd covers only the first two
        let narrow = |value: f64| {
            Spectrum::from_reading(
                SpectralData {
                    status: ExposureStatus::Normal,
                    exposure_time_us: 1000,
                    encoded_exponent: 0,
                    serial: 0,
                    ex_info: 0,
                    spectrum: vec![value; 3],
                },
                ExposureMode::Manual,
                WavelengthRange::new(400, 401).unwrap(),
                None,
            )
        };
        let mut agg = SpectrumAggregator::new(AggregateFunc::Avg, 2).unwrap();
        let out = agg.add(narrow(8.0));
        assert_eq!(out.spd.len(), 2);
        assert_eq!(out.spd_raw.len(), 3);

        // Only spd gets wider, both windows start over
        let out = agg.add(spectrum(&[1.0, 1.0, 1.0]));
        assert_eq!(agg.len(), 1);
        assert_close(&out.spd.values().copied().collect::<Vec<_>>(), &[1.0; 3]);
        assert_close(&out.spd_raw, &[1.0; 3]);

        for value in [3.0, 5.0, 7.0] {
            agg.add(spectrum(&[value; 3]));
        }
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.spd.arrays.len(), 2);
        let out = agg.add(spectrum(&[9.0; 3]));
        assert_close(&out.spd.values().copied().collect::<Vec<_>>(), &[8.0; 3]);
        assert_close(&out.spd_raw, &[8.0; 3]);
    }

    #[test]
    fn aggregate_func_names() {
        assert_ok_eq!("avg".parse::<AggregateFunc>(), AggregateFunc::Avg);
        assert_ok_eq!("max".parse::<AggregateFunc>(), AggregateFunc::Max);
        assert_err!("median".parse::<AggregateFunc>());
        assert_err!(SpectrumAggregator::new(AggregateFunc::Avg, 0));
    }
}
