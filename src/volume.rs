//! Volume control driven by the encoder position.
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::{debug, error};
use regex::Regex;

use crate::config::Config;

/// Playback volume of one mixer control.
pub trait Mixer {
    /// Raw volume range of the control, inclusive.
    fn range(&self) -> Result<(i64, i64)>;
    /// Set every channel of the control.
    fn set_volume(&mut self, volume: i64) -> Result<()>;
}

/// ALSA mixer control driven through the `amixer` utility.
#[derive(Debug, Clone)]
pub struct Amixer {
    device: String,
    control: String,
}

impl Amixer {
    pub fn new(device: &str, control: &str) -> Self {
        Self {
            device: device.to_string(),
            control: control.to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("amixer")
            .arg("-D")
            .arg(&self.device)
            .args(args)
            .output()
            .context("could not run amixer")?;
        if !output.status.success() {
            bail!(
                "amixer {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Mixer for Amixer {
    fn range(&self) -> Result<(i64, i64)> {
        let output = self.run(&["get", &self.control])?;
        parse_range(&output)
            .with_context(|| format!("no playback range for control {}", self.control))
    }

    fn set_volume(&mut self, volume: i64) -> Result<()> {
        let volume = volume.to_string();
        self.run(&sset_args(&self.control, &volume))?;
        Ok(())
    }
}

// `--` keeps a negative raw volume from being read as an option.
fn sset_args<'a>(control: &'a str, volume: &'a str) -> [&'a str; 5] {
    ["-q", "--", "sset", control, volume]
}

/// Read the playback limits from `amixer get` output, for example
/// `Limits: Playback 0 - 207`.
pub fn parse_range(output: &str) -> Result<(i64, i64)> {
    let re = Regex::new(r"(?m)Limits:(?: Playback)? (-?[0-9]+) - (-?[0-9]+)")?;
    let caps = re
        .captures(output)
        .context("capture failure for volume limits")?;
    let min = caps
        .get(1)
        .context("could not read minimum volume")?
        .as_str()
        .parse::<i64>()?;
    let max = caps
        .get(2)
        .context("could not read maximum volume")?
        .as_str()
        .parse::<i64>()?;
    Ok((min, max))
}

/// Shaped volume for step `index` out of `increments`.
///
/// As `factor` goes to 0 the response is logarithmic, towards 1 it becomes
/// linear and above 1 exponential. A factor of exactly 1 is asymptotic.
pub fn curve(index: i64, increments: i64, factor: f64, min: i64, max: i64) -> i64 {
    let power = index as f64 / increments as f64;
    let volume = (factor.powf(power) - 1.0) / (factor - 1.0) * max as f64;
    (volume.max(min as f64).min(max as f64)) as i64
}

pub struct VolumeControl<M> {
    mixer: M,
    min: i64,
    max: i64,
    increments: i64,
    factor: f64,
    index: i64,
    last_position: i64,
    volume: i64,
}

impl<M: Mixer> VolumeControl<M> {
    /// Read the control's range and apply the configured initial volume.
    pub fn new(mut mixer: M, config: &Config) -> Result<Self> {
        let (min, max) = mixer.range()?;
        debug!("card volume range min: {}, max: {}", min, max);

        let index = config.increments * config.initial / 100;
        let volume = curve(index, config.increments, config.factor, min, max);
        mixer
            .set_volume(volume)
            .context("could not set initial volume")?;

        Ok(Self {
            mixer,
            min,
            max,
            increments: config.increments,
            factor: config.factor,
            index,
            last_position: 0,
            volume,
        })
    }

    /// Apply the encoder movement since the last call. Returns the new volume
    /// when the step index changed.
    pub fn sync(&mut self, position: i64) -> Option<i64> {
        let delta = position - self.last_position;
        self.last_position = position;
        if delta == 0 {
            return None;
        }

        let index = (self.index + delta).max(0).min(self.increments);
        if index == self.index {
            return None;
        }
        self.index = index;
        self.volume = curve(index, self.increments, self.factor, self.min, self.max);

        match self.mixer.set_volume(self.volume) {
            Ok(()) => debug!(
                "volume = {}, encoder pos = {}, index = {}",
                self.volume, position, self.index
            ),
            Err(e) => error!("could not set volume to {}: {:#}", self.volume, e),
        }
        Some(self.volume)
    }

    pub fn volume(&self) -> i64 {
        self.volume
    }

    pub fn index(&self) -> i64 {
        self.index
    }
}
