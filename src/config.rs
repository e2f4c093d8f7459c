use std::{fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::accumulator::Bounds;
use crate::decoder::Mode;
use crate::encoder::ChannelPair;
use crate::pins::{self, Channel};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/rotenc.json";
const DEFAULT_DELAY_MS: i64 = 250;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ALSA card, e.g. default or IQaudIODAC
    pub name: String,
    /// Mixer control, e.g. PCM or Digital
    pub control: String,
    pub gpio_a: u64,
    pub gpio_b: u64,
    /// Initial volume in percent
    pub initial: i64,
    /// Volume steps from mute to full
    pub increments: i64,
    /// Volume curve shape. Towards 0 is logarithmic, above 1 exponential.
    pub factor: f64,
    /// Milliseconds between polls of the encoder
    pub delay: i64,
    pub debug: bool,
    pub mode: Mode,
    pub bounds: Option<Bounds>,
    pub active_low: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: "default".to_string(),
            control: "Digital".to_string(),
            gpio_a: 23,
            gpio_b: 24,
            initial: 0,
            increments: 20,
            factor: 0.1,
            delay: DEFAULT_DELAY_MS,
            debug: false,
            mode: Mode::FullStep,
            bounds: None,
            active_low: true,
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
        let reader = BufReader::new(f);
        let config = serde_json::from_reader(reader)
            .with_context(|| format!("could not parse {}", path.display()))?;
        Ok(config)
    }

    /// Like `load_from_path`, but a missing file gives the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        Config::load_from_path(path)
    }

    /// Bring every value into its accepted range, warning about each change.
    pub fn sanitize(mut self) -> Config {
        self.gpio_a = pins::resolve(self.gpio_a, Channel::A).gpio;
        self.gpio_b = pins::resolve(self.gpio_b, Channel::B).gpio;
        if self.gpio_a == self.gpio_b {
            // One pin for both channels only ever reads 00 or 11.
            self.gpio_a = Channel::A.default_assignment().gpio;
            self.gpio_b = Channel::B.default_assignment().gpio;
            warn!(
                "both channels on one GPIO, set to default GPIO {} & {}",
                self.gpio_a, self.gpio_b
            );
        }

        if self.initial > 100 {
            self.initial = 100;
            warn!("initial volume set to {}%", self.initial);
        } else if self.initial < 0 {
            self.initial = 0;
            warn!("initial volume set to {}%", self.initial);
        }

        if self.increments < 1 {
            // Mute / unmute only
            self.increments = 1;
            warn!("increments set to 1, i.e. mute/unmute");
        } else if self.increments > 100 {
            self.increments = 100;
            warn!("increments set to {}", self.increments);
        }

        if self.factor <= 0.0 {
            self.factor = 0.001;
            warn!("factor set to {}", self.factor);
        } else if (self.factor - 1.0).abs() < f64::EPSILON {
            // 1 is asymptotic
            self.factor = 0.999999;
            warn!("factor set to {}", self.factor);
        } else if self.factor > 10.0 {
            self.factor = 10.0;
            warn!("factor set to {}", self.factor);
        }

        if self.delay < 0 || self.delay > 1000 {
            self.delay = DEFAULT_DELAY_MS;
            warn!("delay set to {} ms", self.delay);
        }

        if let Some(bounds) = self.bounds {
            if Bounds::new(bounds.min, bounds.max).is_err() {
                warn!(
                    "ignoring position bounds {}..{}, min is above max",
                    bounds.min, bounds.max
                );
                self.bounds = None;
            }
        }

        self
    }

    pub fn pair(&self) -> ChannelPair {
        ChannelPair {
            a: self.gpio_a,
            b: self.gpio_b,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.delay.max(0) as u64)
    }
}
