mod cli;
mod output;
mod serial;

use clap::Parser;
use serialport::SerialPortType;
use simple_eyre::{eyre::eyre, Result};
use std::io::Write;
use termcolor::{Color, ColorSpec, WriteColor};
use torchbearer::{Backend, ExposureMode};

use cli::*;
use output::{color_stream, StatusLine};
use serial::DeviceConf;

fn main() -> Result<()> {
    simple_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match &cli.command {
        Commands::List => list_serial(),
        Commands::Backends => list_backends(),
        Commands::Info(conf) => get_info(conf),
        Commands::Exposure(subcomm) => match &subcomm.command {
            ExposureCommands::Get(conf) => get_exposure(conf),
            ExposureCommands::Set(conf) => set_exposure(conf),
        },
        Commands::Read(conf) => read(conf),
    }
}

fn init_logging(level: Option<&str>) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

fn list_serial() -> Result<()> {
    let mut stdout = color_stream(atty::Stream::Stdout);
    let ports = serialport::available_ports()?;
    let (color, header) = match ports.len() {
        0 => (Color::Red, "No serial ports found."),
        _ => (Color::Green, "Serial ports:"),
    };
    stdout.set_color(ColorSpec::new().set_fg(Some(color)))?;
    writeln!(stdout, "{}", header)?;
    stdout.reset()?;
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => writeln!(
                stdout,
                "  {} (USB {:04x}:{:04x} {})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.as_deref().unwrap_or("unknown product")
            )?,
            _ => writeln!(stdout, "  {}", port.port_name)?,
        }
    }
    Ok(())
}

fn list_backends() -> Result<()> {
    println!("Available backends:");
    for backend in Backend::ALL {
        println!("  {} ({})", backend, backend.aliases().join(", "));
    }
    Ok(())
}

fn get_info(conf: &DeviceConf) -> Result<()> {
    let mut session = conf.open_session()?;
    let info = session.basic_info()?;
    println!("Backend: {}", conf.device.backend);
    println!("{}", info);
    session.close()?;
    Ok(())
}

fn get_exposure(conf: &DeviceConf) -> Result<()> {
    let mut session = conf.open_session()?;
    println!("Exposure mode: {}", session.exposure_mode()?);
    println!(
        "Exposure time: {} ms",
        f64::from(session.exposure_time()?) / 1000.0
    );
    session.close()?;
    Ok(())
}

fn set_exposure(conf: &SetExposureConf) -> Result<()> {
    let mut session = conf.device.open_session()?;
    match conf.exposure {
        ExposureSetting::Auto => {
            if !session.set_exposure_mode(ExposureMode::Automatic)? {
                return Err(eyre!("Device refused automatic exposure mode"));
            }
        }
        ExposureSetting::Manual { time_ms } => {
            if !session.set_exposure_mode(ExposureMode::Manual)? {
                return Err(eyre!("Device refused manual exposure mode"));
            }
            let time_us = (time_ms * 1000.0).round() as u32;
            if !session.set_exposure_time(time_us)? {
                return Err(eyre!("Device refused exposure time of {} ms", time_ms));
            }
        }
    }
    session.close()?;
    Ok(())
}

fn read(conf: &ReadConf) -> Result<()> {
    let config = conf.acquisition_config()?;
    let mut writer = conf.output.writer()?;
    let mut status = StatusLine::new(conf.peak_window)?;
    let mut session = conf.device.open_session()?;

    let mut taken = 0;
    let mut failure = None;
    session.acquire_with(&config, |spectrum| {
        taken += 1;
        if let Err(err) = status
            .print(taken, &spectrum)
            .and_then(|_| writer.write(&spectrum))
        {
            failure = Some(err);
            return false;
        }
        if conf.oneshot && spectrum.status.is_normal() {
            return false;
        }
        conf.count.map_or(true, |count| taken < count)
    })?;
    session.close()?;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
