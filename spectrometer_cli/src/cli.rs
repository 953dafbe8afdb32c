use crate::{output::Output, serial::DeviceConf};
use clap::{Args, Parser, Subcommand};
use simple_eyre::{eyre::eyre, Result};
use torchbearer::{
    acquisition::MAX_EXPOSURE_TIME_US,
    auto_exposure::{DEFAULT_FULL_SCALE, DEFAULT_MAX_PROBES, DEFAULT_TARGET},
    AcquisitionConfig, AggregateFunc, AggregationConfig, AutoExposureConfig, ExposureControl,
};

pub const MIN_EXPOSURE_MS: f64 = 0.1;
pub const MAX_EXPOSURE_MS: f64 = MAX_EXPOSURE_TIME_US as f64 / 1000.0;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Log filter in env_logger syntax, overrides RUST_LOG
    #[clap(long, value_parser, global = true)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lists connected serial devices
    List,
    /// Lists supported spectrometer backends
    Backends,
    /// Get device id, wavelength range and exposure settings
    Info(DeviceConf),
    /// Exposure mode and time related commands
    Exposure(ExposureCommand),
    /// Stream readings from spectrometer
    Read(ReadConf),
}

#[derive(Args)]
pub struct ExposureCommand {
    #[clap(subcommand)]
    pub command: ExposureCommands,
}

#[derive(Subcommand)]
pub enum ExposureCommands {
    /// Get current exposure mode and time
    Get(DeviceConf),
    /// Switch to automatic exposure or set a fixed exposure time
    Set(SetExposureConf),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ExposureSetting {
    Auto,
    Manual { time_ms: f64 },
}

fn parse_exposure_ms(s: &str) -> Result<f64> {
    let time_ms: f64 = s
        .parse()
        .map_err(|_| eyre!("Expected \"auto\" or exposure time in ms, got {:?}", s))?;
    if !(MIN_EXPOSURE_MS..=MAX_EXPOSURE_MS).contains(&time_ms) {
        return Err(eyre!(
            "Exposure time should be within {}..={} ms",
            MIN_EXPOSURE_MS,
            MAX_EXPOSURE_MS
        ));
    }
    Ok(time_ms)
}

pub fn parse_exposure_setting(s: &str) -> Result<ExposureSetting> {
    match s {
        "auto" => Ok(ExposureSetting::Auto),
        _ => parse_exposure_ms(s).map(|time_ms| ExposureSetting::Manual { time_ms }),
    }
}

#[derive(Args)]
pub struct SetExposureConf {
    /// "auto" or exposure time in ms
    #[clap(value_parser = parse_exposure_setting)]
    pub exposure: ExposureSetting,

    #[clap(flatten)]
    pub device: DeviceConf,
}

/// Who picks exposure time while reading
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ExposureChoice {
    /// Host side search before every reading
    Auto,
    /// Device's own automatic mode
    Device,
    Manual { time_ms: f64 },
}

pub fn parse_exposure_choice(s: &str) -> Result<ExposureChoice> {
    match s {
        "auto" => Ok(ExposureChoice::Auto),
        "device" => Ok(ExposureChoice::Device),
        _ => parse_exposure_ms(s).map(|time_ms| ExposureChoice::Manual { time_ms }),
    }
}

#[derive(Args)]
pub struct ReadConf {
    #[clap(flatten)]
    pub device: DeviceConf,

    /// "auto", "device" or exposure time in ms
    #[clap(short, long, value_parser = parse_exposure_choice, default_value = "auto")]
    pub exposure: ExposureChoice,

    /// Shortest exposure auto exposure may pick, in ms
    #[clap(long, value_parser)]
    pub auto_min_ms: Option<f64>,

    /// Longest exposure auto exposure may pick, in ms
    #[clap(long, value_parser)]
    pub auto_max_ms: Option<f64>,

    /// Desired peak intensity as a fraction of full scale
    #[clap(long, value_parser, default_value_t = DEFAULT_TARGET)]
    pub target: f64,

    /// Maximum amount of readings per auto exposure search
    #[clap(long, value_parser, default_value_t = DEFAULT_MAX_PROBES)]
    pub max_probes: usize,

    /// Largest intensity a pixel can report
    #[clap(long, value_parser, default_value_t = DEFAULT_FULL_SCALE)]
    pub full_scale: f64,

    /// Aggregate readings with "avg" or "max"
    #[clap(long, value_parser)]
    pub aggregate: Option<AggregateFunc>,

    /// Amount of readings aggregated together
    #[clap(long, value_parser, default_value_t = 5)]
    pub window: usize,

    /// Stop after this many readings
    #[clap(short = 'n', long, value_parser)]
    pub count: Option<usize>,

    /// Stop after the first normally exposed reading
    #[clap(long)]
    pub oneshot: bool,

    /// Show maximum peak intensity over this many seconds
    #[clap(long, value_parser)]
    pub peak_window: Option<f64>,

    #[clap(flatten)]
    pub output: Output,
}

impl ReadConf {
    pub fn acquisition_config(&self) -> Result<AcquisitionConfig> {
        let exposure = match self.exposure {
            ExposureChoice::Device => ExposureControl::Device,
            ExposureChoice::Manual { time_ms } => ExposureControl::Manual {
                time_us: (time_ms * 1000.0).round() as u32,
            },
            ExposureChoice::Auto => ExposureControl::Auto(AutoExposureConfig {
                min_ms: self.auto_min_ms,
                max_ms: self.auto_max_ms,
                target: self.target,
                max_probes: self.max_probes,
                full_scale: self.full_scale,
                ..Default::default()
            }),
        };
        let aggregation = self.aggregate.map(|func| AggregationConfig {
            func,
            window_size: self.window,
        });
        let config = AcquisitionConfig {
            exposure,
            aggregation,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exposure_arguments() {
        assert_eq!(
            parse_exposure_setting("auto").unwrap(),
            ExposureSetting::Auto
        );
        assert_eq!(
            parse_exposure_setting("12.5").unwrap(),
            ExposureSetting::Manual { time_ms: 12.5 }
        );
        assert!(parse_exposure_setting("0.05").is_err());
        assert!(parse_exposure_setting("5000.1").is_err());
        assert!(parse_exposure_setting("fast").is_err());
        assert_eq!(
            parse_exposure_choice("device").unwrap(),
            ExposureChoice::Device
        );
    }

    #[test]
    fn read_configuration() {
        let cli = Cli::parse_from([
            "spectrometer_cli",
            "read",
            "tb:/dev/ttyACM0",
            "--aggregate",
            "max",
            "--window",
            "3",
            "--auto-max-ms",
            "200",
        ]);
        let conf = match cli.command {
            Commands::Read(conf) => conf,
            _ => panic!("Expected read command"),
        };
        let config = conf.acquisition_config().unwrap();
        assert_eq!(
            config.aggregation,
            Some(AggregationConfig {
                func: AggregateFunc::Max,
                window_size: 3
            })
        );
        match config.exposure {
            ExposureControl::Auto(auto) => assert_eq!(auto.max_ms, Some(200.0)),
            other => panic!("Unexpected exposure control {:?}", other),
        }

        let cli = Cli::parse_from([
            "spectrometer_cli",
            "read",
            "/dev/ttyUSB0",
            "--exposure",
            "2.5",
            "--aggregate",
            "avg",
            "--window",
            "0",
        ]);
        match cli.command {
            Commands::Read(conf) => {
                assert_eq!(conf.exposure, ExposureChoice::Manual { time_ms: 2.5 });
                assert!(conf.acquisition_config().is_err());
            }
            _ => panic!("Expected read command"),
        }
    }
}
