use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::accumulator::{Accumulator, Bounds};
use crate::decoder::{Decoder, Direction, Mode, START};
use crate::gpio::LevelSampler;
use crate::guard::{EdgeGuard, GuardToken};
use crate::metrics;

/// GPIO numbers of the two encoder channels. Identifies an encoder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelPair {
    pub a: u64,
    pub b: u64,
}

impl fmt::Display for ChannelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.a, self.b)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pulse {
    /// Another decode held the guard, the edge was discarded.
    Dropped,
    Decoded(Direction),
}

/// One physical rotary encoder.
///
/// `pulse` is called from the edge threads of both channels, the position is
/// read from the polling loop.
#[derive(Debug)]
pub struct Encoder {
    pair: ChannelPair,
    mode: Mode,
    label: String,
    // Only written while holding `guard`.
    state: AtomicU8,
    guard: EdgeGuard,
    accumulator: Accumulator,
}

impl Encoder {
    pub fn new(pair: ChannelPair, mode: Mode, bounds: Option<Bounds>) -> Self {
        Self {
            pair,
            mode,
            label: pair.to_string(),
            state: AtomicU8::new(START),
            guard: EdgeGuard::new(),
            accumulator: Accumulator::new(bounds),
        }
    }

    /// Edge callback. Samples both channels while holding the guard so the
    /// levels and the decoder state stay in step.
    pub fn on_edge(&self, sampler: &dyn LevelSampler) -> Result<Pulse> {
        let _token = match self.enter() {
            Some(token) => token,
            None => return Ok(Pulse::Dropped),
        };
        let (a, b) = sampler.sample()?;
        Ok(Pulse::Decoded(self.decode(a, b)))
    }

    /// Handle one edge with already sampled channel levels.
    pub fn pulse(&self, a: u8, b: u8) -> Pulse {
        let _token = match self.enter() {
            Some(token) => token,
            None => return Pulse::Dropped,
        };
        Pulse::Decoded(self.decode(a, b))
    }

    fn enter(&self) -> Option<GuardToken<'_>> {
        let token = self.guard.try_enter();
        if token.is_none() {
            metrics::DROPPED_EDGES.with_label_values(&[self.label.as_str()]).inc();
        }
        token
    }

    // Caller must hold the guard.
    fn decode(&self, a: u8, b: u8) -> Direction {
        let mut decoder = Decoder::resume(self.mode, self.state.load(Ordering::Relaxed));
        let direction = decoder.decode(a, b);
        self.state.store(decoder.state(), Ordering::Relaxed);

        if direction != Direction::None {
            let position = self.accumulator.apply(direction);
            metrics::STEPS
                .with_label_values(&[self.label.as_str(), direction_label(direction)])
                .inc();
            metrics::POSITION.with_label_values(&[self.label.as_str()]).set(position);
        }
        direction
    }

    pub fn position(&self) -> i64 {
        self.accumulator.position()
    }

    /// Direction of the last completed step.
    pub fn direction(&self) -> Direction {
        self.accumulator.direction()
    }

    pub fn dropped_edges(&self) -> u64 {
        self.guard.dropped()
    }

    pub fn pair(&self) -> ChannelPair {
        self.pair
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.accumulator.bounds()
    }

    pub fn state(&self) -> u8 {
        self.state.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn guard(&self) -> &EdgeGuard {
        &self.guard
    }
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Clockwise => "clockwise",
        Direction::CounterClockwise => "counter_clockwise",
        Direction::None => "none",
    }
}

/// Encoders keyed by their channel pair. Owned by the caller.
#[derive(Debug, Default)]
pub struct Encoders {
    encoders: HashMap<ChannelPair, Arc<Encoder>>,
}

impl Encoders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, encoder: Encoder) -> Result<Arc<Encoder>> {
        let pair = encoder.pair();
        if self.encoders.contains_key(&pair) {
            bail!("an encoder is already registered on channels {}", pair);
        }
        let encoder = Arc::new(encoder);
        self.encoders.insert(pair, encoder.clone());
        Ok(encoder)
    }

    pub fn get(&self, pair: &ChannelPair) -> Option<&Arc<Encoder>> {
        self.encoders.get(pair)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Encoder>> {
        self.encoders.values()
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::FULL_STEP_STATES;
    use std::thread;

    const CW: [(u8, u8); 4] = [(1, 0), (1, 1), (0, 1), (0, 0)];
    const CCW: [(u8, u8); 4] = [(0, 1), (1, 1), (1, 0), (0, 0)];

    fn pair(a: u64, b: u64) -> ChannelPair {
        ChannelPair { a, b }
    }

    fn turn(encoder: &Encoder, levels: &[(u8, u8)]) -> Vec<Pulse> {
        levels.iter().map(|&(a, b)| encoder.pulse(a, b)).collect()
    }

    #[test]
    fn starts_at_rest() {
        let encoder = Encoder::new(pair(23, 24), Mode::FullStep, None);
        assert_eq!(encoder.position(), 0);
        assert_eq!(encoder.direction(), Direction::None);
        assert_eq!(encoder.state(), START);
        assert_eq!(encoder.dropped_edges(), 0);
    }

    #[test]
    fn full_step_turns_move_position() {
        let encoder = Encoder::new(pair(23, 24), Mode::FullStep, None);
        let pulses = turn(&encoder, &CW);
        assert_eq!(pulses.last(), Some(&Pulse::Decoded(Direction::Clockwise)));
        assert_eq!(encoder.position(), 1);
        assert_eq!(encoder.direction(), Direction::Clockwise);

        turn(&encoder, &CCW);
        turn(&encoder, &CCW);
        assert_eq!(encoder.position(), -1);
        assert_eq!(encoder.direction(), Direction::CounterClockwise);
        assert_eq!(encoder.state(), START);
    }

    #[test]
    fn difference_mode_counts_quarter_steps() {
        let encoder = Encoder::new(pair(5, 6), Mode::Difference, None);
        // last code 01, new code 00
        encoder.pulse(0, 1);
        assert_eq!(encoder.position(), -1);
        assert_eq!(encoder.pulse(0, 0), Pulse::Decoded(Direction::Clockwise));
        assert_eq!(encoder.position(), 0);

        turn(&encoder, &CW);
        assert_eq!(encoder.position(), 4);
    }

    #[test]
    fn clamps_published_position_only() {
        let bounds = Bounds::new(0, 2).unwrap();
        let encoder = Encoder::new(pair(17, 27), Mode::FullStep, Some(bounds));
        for _ in 0..5 {
            turn(&encoder, &CW);
        }
        assert_eq!(encoder.position(), 2);
        assert_eq!(encoder.state(), START);

        // Decoding keeps working at the limit.
        turn(&encoder, &CCW);
        assert_eq!(encoder.position(), 1);
        for _ in 0..5 {
            turn(&encoder, &CCW);
        }
        assert_eq!(encoder.position(), 0);
    }

    #[test]
    fn edge_during_decode_is_dropped() {
        let encoder = Encoder::new(pair(22, 23), Mode::FullStep, None);
        turn(&encoder, &CW[..2]);
        let state = encoder.state();

        let token = encoder.guard().try_enter();
        assert!(token.is_some());
        assert_eq!(encoder.pulse(0, 1), Pulse::Dropped);
        assert_eq!(encoder.state(), state);
        assert_eq!(encoder.position(), 0);
        assert_eq!(encoder.dropped_edges(), 1);
        drop(token);

        turn(&encoder, &CW[2..]);
        assert_eq!(encoder.position(), 1);
        assert_eq!(encoder.dropped_edges(), 1);
    }

    struct Fixed(u8, u8);

    impl LevelSampler for Fixed {
        fn sample(&self) -> Result<(u8, u8)> {
            Ok((self.0, self.1))
        }
    }

    #[test]
    fn on_edge_samples_under_guard() {
        let encoder = Encoder::new(pair(23, 24), Mode::Difference, None);
        assert_eq!(
            encoder.on_edge(&Fixed(1, 0)).unwrap(),
            Pulse::Decoded(Direction::Clockwise)
        );

        let token = encoder.guard().try_enter();
        assert_eq!(encoder.on_edge(&Fixed(1, 1)).unwrap(), Pulse::Dropped);
        drop(token);

        assert_eq!(encoder.position(), 1);
        assert_eq!(encoder.dropped_edges(), 1);
    }

    #[test]
    fn concurrent_edges_keep_state_legal() {
        let encoder = Arc::new(Encoder::new(pair(9, 10), Mode::FullStep, None));
        let handles: Vec<_> = [CW, CCW]
            .iter()
            .map(|&levels| {
                let encoder = encoder.clone();
                thread::spawn(move || {
                    let mut dropped = 0u64;
                    for _ in 0..2_000 {
                        for &(a, b) in levels.iter() {
                            if encoder.pulse(a, b) == Pulse::Dropped {
                                dropped += 1;
                            }
                            assert!(encoder.state() < FULL_STEP_STATES);
                        }
                    }
                    dropped
                })
            })
            .collect();
        let dropped: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(encoder.dropped_edges(), dropped);
        assert!(encoder.state() < FULL_STEP_STATES);
        assert!(encoder.position().abs() <= 4_000);
    }

    #[test]
    fn encoders_are_independent() {
        let mut encoders = Encoders::new();
        let first = encoders
            .insert(Encoder::new(pair(23, 24), Mode::FullStep, None))
            .unwrap();
        let second = encoders
            .insert(Encoder::new(pair(17, 18), Mode::Difference, None))
            .unwrap();
        assert_eq!(encoders.len(), 2);

        turn(&first, &CW);
        assert_eq!(first.position(), 1);
        assert_eq!(second.position(), 0);
        assert_eq!(
            encoders.get(&pair(23, 24)).map(|e| e.position()),
            Some(1)
        );
        assert!(encoders.get(&pair(1, 2)).is_none());
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let mut encoders = Encoders::new();
        encoders
            .insert(Encoder::new(pair(23, 24), Mode::FullStep, None))
            .unwrap();
        assert!(encoders
            .insert(Encoder::new(pair(23, 24), Mode::Difference, None))
            .is_err());
        assert_eq!(encoders.len(), 1);
    }

    #[test]
    fn pair_display() {
        assert_eq!(pair(23, 24).to_string(), "23/24");
    }
}
