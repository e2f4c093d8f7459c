use std::{env, path::Path, thread};

use anyhow::{Context, Result};
use log::{debug, info, log_enabled, trace, warn, Level};
use rotenc::{
    config::{Config, DEFAULT_CONFIG_PATH},
    encoder::{Encoder, Encoders},
    gpio::EdgeWatcher,
    metrics, pins,
    volume::{Amixer, VolumeControl},
};

fn main() -> Result<()> {
    let config_path =
        env::var("ROTENC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)?;

    // Debug printing can be switched on from the config, RUST_LOG still wins
    let filter = if config.debug { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(filter));
    if !Path::new(&config_path).exists() {
        info!("{} not found, using defaults", config_path);
    }

    let config = config.sanitize();
    print_params(&config);

    // Mixer, set to the initial volume before the encoder can move it
    let mixer = Amixer::new(&config.name, &config.control);
    let mut volume = VolumeControl::new(mixer, &config)
        .with_context(|| format!("could not open mixer {}/{}", config.name, config.control))?;

    // Encoder and its edge threads
    let mut encoders = Encoders::new();
    let encoder = encoders.insert(Encoder::new(config.pair(), config.mode, config.bounds))?;
    let mut watcher = EdgeWatcher::new();
    watcher
        .register(encoder.clone(), config.active_low)
        .with_context(|| format!("could not watch encoder on GPIO {}", encoder.pair()))?;
    info!(
        "watching encoder on GPIO {} ({:?}), volume {}",
        encoder.pair(),
        encoder.mode(),
        volume.volume()
    );

    let mut dropped = 0;
    loop {
        if let Some(v) = volume.sync(encoder.position()) {
            info!("volume {} ({:?})", v, encoder.direction());
        }

        let now_dropped = encoder.dropped_edges();
        if now_dropped != dropped {
            debug!("{} edges dropped so far", now_dropped);
            dropped = now_dropped;
            if log_enabled!(Level::Trace) {
                match metrics::render() {
                    Ok(text) => trace!("{}", text),
                    Err(e) => warn!("could not render metrics: {:#}", e),
                }
            }
        }

        // Edges keep arriving on the edge threads while we sleep
        thread::sleep(config.poll_interval());
    }
}

fn print_params(config: &Config) {
    let wiring_pi = |gpio| {
        pins::wiring_pi(gpio)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string())
    };
    debug!("hardware name = {}", config.name);
    debug!("hardware control = {}", config.control);
    debug!(
        "GPIO pins {} & {}, wiringPi numbers {} & {}",
        config.gpio_a,
        config.gpio_b,
        wiring_pi(config.gpio_a),
        wiring_pi(config.gpio_b)
    );
    debug!("initial volume = {}%", config.initial);
    debug!("volume factor = {}", config.factor);
    debug!("volume increments = {}", config.increments);
    debug!("tic delay = {} ms", config.delay);
    debug!("decoder = {:?}, bounds = {:?}", config.mode, config.bounds);
}
