use clap::Args;
use simple_eyre::{eyre::eyre, Result};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use time::{format_description::FormatItem, macros::format_description, UtcOffset};
use torchbearer::{ExposureStatus, SlidingMax, Spectrum};

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

#[derive(Args)]
pub struct Output {
    /// Path to a CSV file where readings should be stored, stdout if omitted
    #[clap(short, long, value_parser = unique_path_parser, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

fn unique_path_parser(p: &str) -> Result<PathBuf> {
    let p = Path::new(p);
    if p.try_exists()? {
        Err(eyre!("Path {p:?} already exists"))
    } else {
        Ok(p.to_path_buf())
    }
}

/// Returns a stream with coloring enabled if program is run interactively
pub fn color_stream(stream: atty::Stream) -> StandardStream {
    let choice = if atty::is(stream) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    match stream {
        atty::Stream::Stderr => StandardStream::stderr(choice),
        _ => StandardStream::stdout(choice),
    }
}

fn format_timestamp(spectrum: &Spectrum) -> Result<String> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    Ok(spectrum.timestamp.to_offset(offset).format(TIMESTAMP_FORMAT)?)
}

fn csv_header(spectrum: &Spectrum) -> String {
    log::trace!("Formatting CSV header");
    let mut fields = vec![
        "timestamp".to_string(),
        "status".to_string(),
        "exposure".to_string(),
        "time_ms".to_string(),
    ];
    fields.extend(spectrum.spd.keys().map(|wl| wl.to_string()));
    fields.join(",")
}

fn spectrum_to_csv(spectrum: &Spectrum) -> Result<String> {
    log::trace!("Formatting spectrum as CSV");
    let mut fields = vec![
        format_timestamp(spectrum)?,
        spectrum.status.to_string(),
        spectrum.exposure.to_string(),
        spectrum.time_ms.to_string(),
    ];
    fields.extend(spectrum.spd.values().map(|v| v.to_string()));
    Ok(fields.join(","))
}

/// Writes spectra as CSV, one per line
pub struct SpectrumWriter {
    out: Box<dyn Write>,
    header_written: bool,
}

impl Output {
    pub fn writer(&self) -> Result<SpectrumWriter> {
        let out: Box<dyn Write> = match &self.output {
            Some(path) => {
                log::debug!("Saving readings to {:?}", path);
                Box::new(BufWriter::new(File::create(path)?))
            }
            None => Box::new(io::stdout()),
        };
        Ok(SpectrumWriter {
            out,
            header_written: false,
        })
    }
}

impl SpectrumWriter {
    pub fn write(&mut self, spectrum: &Spectrum) -> Result<()> {
        if !self.header_written {
            writeln!(self.out, "{}", csv_header(spectrum))?;
            self.header_written = true;
        }
        writeln!(self.out, "{}", spectrum_to_csv(spectrum)?)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Colored one line summary of every reading, printed to stderr
pub struct StatusLine {
    stderr: StandardStream,
    peak: Option<SlidingMax>,
}

impl StatusLine {
    pub fn new(peak_window: Option<f64>) -> Result<Self> {
        Ok(StatusLine {
            stderr: color_stream(atty::Stream::Stderr),
            peak: peak_window.map(SlidingMax::new).transpose()?,
        })
    }

    pub fn print(&mut self, idx: usize, spectrum: &Spectrum) -> Result<()> {
        let color = match spectrum.status {
            ExposureStatus::Normal => Color::Green,
            ExposureStatus::Under => Color::Yellow,
            ExposureStatus::Over => Color::Red,
        };
        let peak = spectrum.peak().unwrap_or(0.0);
        self.stderr.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(self.stderr, "#{} {}", idx, spectrum.status)?;
        self.stderr.reset()?;
        write!(
            self.stderr,
            " {} exposure, {} ms, peak {:.2}",
            spectrum.exposure, spectrum.time_ms, peak
        )?;
        if let Some(window) = self.peak.as_mut() {
            if let Some(max) = window.add(peak) {
                write!(
                    self.stderr,
                    ", max {:.2} over {} s",
                    max,
                    window.window_size()
                )?;
            }
        }
        writeln!(self.stderr, " [{}]", spectrum.y_axis)?;
        Ok(())
    }
}
