use log::info;
use std::path::{Path, PathBuf};

use libgpiod::{chip::Chip, line, request};
use parking_lot::FairMutex;

use crate::error::HardwareError;
use crate::gpio::{GpioBackend, Level, PinHandle};

/// Backend over the Linux GPIO character device. Pin numbers are line
/// offsets on a single chip.
pub struct LibgpiodBackend {
    chip: PathBuf,
    num_lines: usize,
}

impl LibgpiodBackend {
    pub fn new<P: AsRef<Path>>(chip: P) -> Result<Self, HardwareError> {
        let path = chip.as_ref().to_path_buf();
        let chip = open_chip(&path)?;
        let num_lines = chip
            .info()
            .map_err(|e| HardwareError::Io(format!("chip info {}: {e}", path.display())))?
            .num_lines();

        info!("Opened {} with {num_lines} lines", path.display());

        Ok(Self {
            chip: path,
            num_lines,
        })
    }
}

impl GpioBackend for LibgpiodBackend {
    type Pin = LibgpiodPin;

    fn resolve(&self, pin: u32) -> Result<LibgpiodPin, HardwareError> {
        if pin as usize >= self.num_lines {
            return Err(HardwareError::NotFound(pin));
        }

        // lines start out as floating inputs until the registry picks a direction
        let chip = open_chip(&self.chip)?;
        let line_cfg = make_line_config(pin, make_input_settings()?)?;
        let request = request_lines(&chip, &line_cfg)?;

        Ok(LibgpiodPin {
            offset: pin,
            request: FairMutex::new(request),
            output: false,
        })
    }
}

pub struct LibgpiodPin {
    offset: u32,
    request: FairMutex<request::Request>,
    output: bool,
}

impl PinHandle for LibgpiodPin {
    fn set_level(&mut self, level: Level) -> Result<(), HardwareError> {
        if self.output {
            return self
                .request
                .lock()
                .set_value(self.offset, to_value(level))
                .map(|_| ())
                .map_err(|e| HardwareError::Io(format!("set value: {e}")));
        }

        let line_cfg = make_line_config(self.offset, make_output_settings(level)?)?;
        self.request
            .lock()
            .reconfigure_lines(&line_cfg)
            .map_err(|e| HardwareError::Io(format!("reconfigure lines: {e}")))?;
        self.output = true;
        Ok(())
    }

    fn read_level(&self) -> Result<Level, HardwareError> {
        let value = self
            .request
            .lock()
            .value(self.offset)
            .map_err(|e| HardwareError::Io(format!("get value: {e}")))?;
        Ok(match value {
            line::Value::InActive => Level::Low,
            line::Value::Active => Level::High,
        })
    }

    fn configure_input(&mut self) -> Result<(), HardwareError> {
        let line_cfg = make_line_config(self.offset, make_input_settings()?)?;
        self.request
            .lock()
            .reconfigure_lines(&line_cfg)
            .map_err(|e| HardwareError::Io(format!("reconfigure lines: {e}")))?;
        self.output = false;
        Ok(())
    }
}

fn to_value(level: Level) -> line::Value {
    match level {
        Level::Low => line::Value::InActive,
        Level::High => line::Value::Active,
    }
}

fn open_chip(path: &Path) -> Result<Chip, HardwareError> {
    Chip::open(&path).map_err(|e| HardwareError::Io(format!("open chip {}: {e}", path.display())))
}

fn request_lines(chip: &Chip, line_cfg: &line::Config) -> Result<request::Request, HardwareError> {
    let mut req_cfg =
        request::Config::new().map_err(|e| HardwareError::Io(format!("request config: {e}")))?;
    req_cfg
        .set_consumer(env!("CARGO_PKG_NAME"))
        .map_err(|e| HardwareError::Io(format!("request consumer: {e}")))?;
    chip.request_lines(Some(&req_cfg), line_cfg)
        .map_err(|e| HardwareError::Io(format!("request lines: {e}")))
}

fn make_input_settings() -> Result<line::Settings, HardwareError> {
    let mut ls =
        line::Settings::new().map_err(|e| HardwareError::Io(format!("libgpiod settings: {e}")))?;
    ls.set_direction(line::Direction::Input)
        .map_err(|e| HardwareError::Io(format!("set direction: {e}")))?;
    ls.set_bias(None)
        .map_err(|e| HardwareError::Io(format!("set bias: {e}")))?;
    ls.set_edge_detection(None)
        .map_err(|e| HardwareError::Io(format!("set edge detection: {e}")))?;
    Ok(ls)
}

fn make_output_settings(level: Level) -> Result<line::Settings, HardwareError> {
    let mut ls =
        line::Settings::new().map_err(|e| HardwareError::Io(format!("libgpiod settings: {e}")))?;
    ls.set_direction(line::Direction::Output)
        .map_err(|e| HardwareError::Io(format!("set direction: {e}")))?;
    ls.set_drive(line::Drive::PushPull)
        .map_err(|e| HardwareError::Io(format!("set drive: {e}")))?;
    ls.set_output_value(to_value(level))
        .map_err(|e| HardwareError::Io(format!("set output value: {e}")))?;
    Ok(ls)
}

fn make_line_config(offset: u32, settings: line::Settings) -> Result<line::Config, HardwareError> {
    let mut cfg =
        line::Config::new().map_err(|e| HardwareError::Io(format!("line config: {e}")))?;
    cfg.add_line_settings(&[offset], settings)
        .map_err(|e| HardwareError::Io(format!("line config add settings: {e}")))?;
    Ok(cfg)
}
