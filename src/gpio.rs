//! Encoder channels on the Linux sysfs GPIO interface.
//!
//! The kernel reports edges by waking a poll(2) on the `value` file of an
//! exported pin with its `edge` set. Each channel gets its own thread blocked
//! on that poller, so edges on A and B are handled concurrently and the
//! encoder's guard decides which one wins.
//!
//! Pull-ups are not configurable through sysfs. The encoder common is
//! grounded, so enable them in the device tree or fit resistors.
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use log::{debug, error, warn};
use sysfs_gpio::{Direction, Edge, Pin, PinPoller};

use crate::encoder::{ChannelPair, Encoder, Pulse};

/// Reads the current level of both encoder channels.
pub trait LevelSampler: Send + Sync {
    fn sample(&self) -> Result<(u8, u8)>;
}

/// Blocks until the next edge on one channel.
pub trait EdgeSource: Send {
    /// `Ok(false)` means the wait ended without an edge.
    fn wait(&mut self) -> Result<bool>;
}

// The first poll returns straight away with the current level. Decoding the
// rest position is a no-op.
impl EdgeSource for PinPoller {
    fn wait(&mut self) -> Result<bool> {
        Ok(self.poll(-1)?.is_some())
    }
}

/// Both channels of one encoder, exported as inputs with interrupts on both
/// edges.
#[derive(Debug, Clone, Copy)]
pub struct SysfsChannels {
    a: Pin,
    b: Pin,
}

impl SysfsChannels {
    /// Export and configure both pins.
    ///
    /// # Errors
    ///
    /// Fails when the system has no sysfs GPIO support, the pin is out of
    /// range, or the kernel already claimed it.
    pub fn open(pair: ChannelPair, active_low: bool) -> Result<SysfsChannels> {
        Ok(SysfsChannels {
            a: open_input(pair.a, active_low)?,
            b: open_input(pair.b, active_low)?,
        })
    }

    /// One poller per channel, A first.
    pub fn pollers(&self) -> Result<Vec<PinPoller>> {
        [self.a, self.b]
            .iter()
            .map(|pin| {
                pin.get_poller()
                    .with_context(|| format!("could not poll GPIO {}", pin.get_pin_num()))
            })
            .collect()
    }
}

impl LevelSampler for SysfsChannels {
    fn sample(&self) -> Result<(u8, u8)> {
        let a = self.a.get_value().context("could not read channel A")?;
        let b = self.b.get_value().context("could not read channel B")?;
        Ok((a, b))
    }
}

fn open_input(gpio: u64, active_low: bool) -> Result<Pin> {
    let pin = Pin::new(gpio);
    pin.export()
        .with_context(|| format!("could not export GPIO {}", gpio))?;
    pin.set_direction(Direction::In)
        .with_context(|| format!("could not set direction for GPIO {}", gpio))?;
    pin.set_edge(Edge::BothEdges)
        .with_context(|| format!("could not set edge for GPIO {}", gpio))?;
    pin.set_active_low(active_low)
        .with_context(|| format!("could not set active low for GPIO {}", gpio))?;
    Ok(pin)
}

/// Edge threads for every registered encoder. Registration lasts for the
/// lifetime of the process.
#[derive(Debug, Default)]
pub struct EdgeWatcher {
    threads: Vec<JoinHandle<()>>,
}

impl EdgeWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the encoder's pins on sysfs and start delivering their edges.
    pub fn register(&mut self, encoder: Arc<Encoder>, active_low: bool) -> Result<()> {
        let channels = SysfsChannels::open(encoder.pair(), active_low)?;
        let sources = channels
            .pollers()?
            .into_iter()
            .map(|poller| Box::new(poller) as Box<dyn EdgeSource>)
            .collect();
        self.register_sources(encoder, Arc::new(channels), sources)
    }

    /// Start one thread per source. Every edge samples both channels and feeds
    /// the encoder.
    pub fn register_sources(
        &mut self,
        encoder: Arc<Encoder>,
        sampler: Arc<dyn LevelSampler>,
        sources: Vec<Box<dyn EdgeSource>>,
    ) -> Result<()> {
        for (index, mut source) in sources.into_iter().enumerate() {
            let encoder = encoder.clone();
            let sampler = sampler.clone();
            let name = format!("edge-{}-{}", encoder.pair(), index);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || loop {
                    match source.wait() {
                        Ok(true) => match encoder.on_edge(sampler.as_ref()) {
                            Ok(Pulse::Dropped) => debug!("{}: edge dropped", name),
                            Ok(Pulse::Decoded(_)) => {}
                            Err(e) => warn!("{}: could not sample channels: {:#}", name, e),
                        },
                        Ok(false) => {}
                        Err(e) => {
                            error!("{}: edge source failed: {:#}", name, e);
                            break;
                        }
                    }
                })
                .context("could not spawn edge thread")?;
            self.threads.push(handle);
        }
        Ok(())
    }

    /// Wait for every edge thread to stop. They only stop when their source
    /// fails.
    pub fn join(self) {
        for handle in self.threads {
            if handle.join().is_err() {
                error!("edge thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Direction, Mode};
    use anyhow::bail;
    use std::sync::{
        mpsc::{channel, Receiver},
        Mutex,
    };

    // Edge source fed from a channel. Ends when the sender is dropped.
    struct ChannelSource(Receiver<()>);

    impl EdgeSource for ChannelSource {
        fn wait(&mut self) -> Result<bool> {
            match self.0.recv() {
                Ok(()) => Ok(true),
                Err(_) => bail!("edge channel closed"),
            }
        }
    }

    // Replays a fixed list of channel levels, one per sample.
    struct Replay(Mutex<Vec<(u8, u8)>>);

    impl LevelSampler for Replay {
        fn sample(&self) -> Result<(u8, u8)> {
            match self.0.lock().unwrap().pop() {
                Some(levels) => Ok(levels),
                None => bail!("no more samples"),
            }
        }
    }

    #[test]
    fn edges_drive_the_encoder() {
        let encoder = Arc::new(Encoder::new(
            ChannelPair { a: 23, b: 24 },
            Mode::FullStep,
            None,
        ));
        // Popped from the back: one clockwise detent.
        let levels = vec![(0, 0), (0, 1), (1, 1), (1, 0)];
        let sampler = Arc::new(Replay(Mutex::new(levels)));

        let (tx, rx) = channel();
        let mut watcher = EdgeWatcher::new();
        watcher
            .register_sources(
                encoder.clone(),
                sampler,
                vec![Box::new(ChannelSource(rx))],
            )
            .unwrap();

        // The fifth edge finds no sample and is skipped.
        for _ in 0..5 {
            tx.send(()).unwrap();
        }
        drop(tx);
        watcher.join();

        assert_eq!(encoder.position(), 1);
        assert_eq!(encoder.direction(), Direction::Clockwise);
        assert_eq!(encoder.dropped_edges(), 0);
    }
}
