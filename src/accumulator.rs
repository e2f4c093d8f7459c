//! Step counter shared between the edge handler and the polling loop.
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::decoder::Direction;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: i64,
    pub max: i64,
}

impl Bounds {
    pub fn new(min: i64, max: i64) -> Result<Bounds> {
        if min > max {
            bail!("invalid position bounds: min {} is above max {}", min, max);
        }
        Ok(Bounds { min, max })
    }

    pub fn clamp(&self, position: i64) -> i64 {
        position.max(self.min).min(self.max)
    }
}

/// Position and last direction. Written only from the guarded decode path,
/// read by anyone.
#[derive(Debug)]
pub struct Accumulator {
    position: AtomicI64,
    direction: AtomicU8,
    bounds: Option<Bounds>,
}

impl Accumulator {
    pub fn new(bounds: Option<Bounds>) -> Self {
        Self {
            position: AtomicI64::new(0),
            direction: AtomicU8::new(Direction::None.to_raw()),
            bounds,
        }
    }

    /// Apply a decoded direction and return the new position.
    pub fn apply(&self, direction: Direction) -> i64 {
        self.direction.store(direction.to_raw(), Ordering::Release);

        let delta = direction.delta();
        if delta == 0 {
            return self.position();
        }

        let bounds = self.bounds;
        let next = |p: i64| {
            let p = p.saturating_add(delta);
            bounds.map_or(p, |b| b.clamp(p))
        };
        let previous = self
            .position
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| Some(next(p)))
            .unwrap_or_else(|p| p);
        next(previous)
    }

    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn direction(&self) -> Direction {
        Direction::from_raw(self.direction.load(Ordering::Acquire))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }
}
