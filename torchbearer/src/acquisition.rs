use crate::{
    aggregator::{AggregateFunc, SpectrumAggregator},
    auto_exposure::AutoExposureConfig,
    error::{Error, Result},
    flags::ExposureMode,
    io_adapter::IoAdapter,
    session::Session,
    spectrum::Spectrum,
};
use crossbeam_channel::{bounded, Receiver};
use std::thread::{self, JoinHandle};

/// Longest integration time the device accepts, in µs
pub const MAX_EXPOSURE_TIME_US: u32 = 5_000_000;

/// Who decides on integration time
#[derive(Debug, Clone, PartialEq)]
pub enum ExposureControl {
    /// Device's own automatic mode
    Device,
    /// Fixed integration time
    Manual { time_us: u32 },
    /// Integration time searched for before every reading
    Auto(AutoExposureConfig),
}

impl Default for ExposureControl {
    fn default() -> Self {
        ExposureControl::Auto(AutoExposureConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationConfig {
    pub func: AggregateFunc,
    pub window_size: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcquisitionConfig {
    pub exposure: ExposureControl,
    pub aggregation: Option<AggregationConfig>,
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<()> {
        match &self.exposure {
            ExposureControl::Device => {}
            ExposureControl::Manual { time_us } => {
                if !(1..=MAX_EXPOSURE_TIME_US).contains(time_us) {
                    return Err(Error::config(format!(
                        "exposure time should be within 1..={} µs, got {}",
                        MAX_EXPOSURE_TIME_US, time_us
                    )));
                }
            }
            ExposureControl::Auto(auto) => auto.validate()?,
        }
        if let Some(aggregation) = &self.aggregation {
            SpectrumAggregator::new(aggregation.func, aggregation.window_size)?;
        }
        Ok(())
    }
}

fn require(accepted: bool, what: &'static str) -> Result<()> {
    if accepted {
        Ok(())
    } else {
        Err(Error::Refused(what))
    }
}

impl<IO: IoAdapter> Session<IO> {
    /// Programs the device according to `config` and streams readings into `callback` until
    /// it returns `false`. Nothing is sent to the device if `config` is invalid.
    pub fn acquire_with<F>(&mut self, config: &AcquisitionConfig, mut callback: F) -> Result<()>
    where
        F: FnMut(Spectrum) -> bool,
    {
        config.validate()?;
        let mut aggregator = config
            .aggregation
            .map(|a| SpectrumAggregator::new(a.func, a.window_size))
            .transpose()?;
        let mut deliver = |spectrum: Spectrum| {
            let spectrum = match aggregator.as_mut() {
                Some(aggregator) => aggregator.add(spectrum),
                None => spectrum,
            };
            callback(spectrum)
        };

        match &config.exposure {
            ExposureControl::Device => {
                require(
                    self.set_exposure_mode(ExposureMode::Automatic)?,
                    "automatic exposure mode",
                )?;
                self.stream(deliver)
            }
            ExposureControl::Manual { time_us } => {
                require(
                    self.set_exposure_mode(ExposureMode::Manual)?,
                    "manual exposure mode",
                )?;
                require(self.set_exposure_time(*time_us)?, "exposure time")?;
                self.stream(deliver)
            }
            ExposureControl::Auto(auto) => {
                require(
                    self.set_exposure_mode(ExposureMode::Manual)?,
                    "manual exposure mode",
                )?;
                let (_, high) = auto.bounds_us();
                let mut seed = self.facts().exposure_time_us.unwrap_or(high);
                loop {
                    let settled = auto.run(self, seed)?;
                    log::debug!(
                        "Settled on {} µs after {} probes",
                        settled.exposure_time_us,
                        settled.probes
                    );
                    self.record_exposure_time(settled.exposure_time_us);
                    seed = settled.exposure_time_us;
                    let spectrum = Spectrum {
                        exposure: ExposureMode::Automatic,
                        ..settled.reading
                    };
                    if !deliver(spectrum) {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Runs [`Session::acquire_with`] on a worker thread.
///
/// Readings are sent into a channel of `capacity`, the worker blocks while it is full. Dropping
/// the receiver stops acquisition at the next reading, after which the session is handed back
/// through the join handle.
pub fn spawn_acquisition<IO>(
    mut session: Session<IO>,
    config: AcquisitionConfig,
    capacity: usize,
) -> Result<(Receiver<Spectrum>, JoinHandle<Result<Session<IO>>>)>
where
    IO: IoAdapter + Send + 'static,
{
    config.validate()?;
    let (tx, rx) = bounded(capacity);
    let handle = thread::Builder::new()
        .name("torchbearer-acquisition".to_string())
        .spawn(move || -> Result<Session<IO>> {
            session.acquire_with(&config, |spectrum| tx.send(spectrum).is_ok())?;
            log::debug!("Acquisition finished");
            Ok(session)
        })?;
    Ok((rx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;

    #[test]
    fn validate_config() {
        assert_ok!(AcquisitionConfig::default().validate());
        assert_ok!(AcquisitionConfig {
            exposure: ExposureControl::Manual { time_us: 100 },
            aggregation: Some(AggregationConfig {
                func: AggregateFunc::Max,
                window_size: 1,
            }),
        }
        .validate());
        assert_err!(AcquisitionConfig {
            exposure: ExposureControl::Manual { time_us: 0 },
            aggregation: None,
        }
        .validate());
        assert_err!(AcquisitionConfig {
            exposure: ExposureControl::Manual {
                time_us: MAX_EXPOSURE_TIME_US + 1
            },
            aggregation: None,
        }
        .validate());
        assert_matches!(
            AcquisitionConfig {
                exposure: ExposureControl::Device,
                aggregation: Some(AggregationConfig {
                    func: AggregateFunc::Avg,
                    window_size: 0,
                }),
            }
            .validate(),
            Err(Error::InvalidConfig(_))
        );
        assert_err!(AcquisitionConfig {
            exposure: ExposureControl::Auto(AutoExposureConfig {
                max_probes: 1,
                ..Default::default()
            }),
            aggregation: None,
        }
        .validate());
    }
}
