//! Quadrature decoding for a two channel rotary encoder.
//!
//! Both channels are sampled on every edge and combined into a 2-bit code
//! `AB`. Turning the knob clockwise walks the Gray sequence
//!
//! ```text
//!   00 -> 10 -> 11 -> 01 -> 00
//! ```
//!
//! and counter clockwise walks it backwards. Two decoders are available:
//!
//! * [`Mode::FullStep`] runs a state machine that only reports a direction
//!   once a full cycle has returned to rest. Bounced or illegal codes send it
//!   back to `START`.
//! * [`Mode::Difference`] compares the previous and current code and reports
//!   every quarter step. More responsive, but a single bounce shows up as a
//!   step.
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
    None,
}

/// Map a 4-bit `(last << 2) | code` sum to a direction.
impl From<u8> for Direction {
    fn from(s: u8) -> Self {
        match s {
            0b0010 | 0b1011 | 0b1101 | 0b0100 => Direction::Clockwise,
            0b0001 | 0b0111 | 0b1110 | 0b1000 => Direction::CounterClockwise,
            _ => Direction::None,
        }
    }
}

impl Direction {
    /// Position change for this direction.
    pub fn delta(self) -> i64 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
            Direction::None => 0,
        }
    }

    pub(crate) fn to_raw(self) -> u8 {
        match self {
            Direction::None => 0,
            Direction::Clockwise => 1,
            Direction::CounterClockwise => 2,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Direction::Clockwise,
            2 => Direction::CounterClockwise,
            _ => Direction::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    FullStep,
    Difference,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::FullStep
    }
}

impl Mode {
    /// Advance one edge. Returns the state to store and the detected direction.
    pub fn step(self, state: u8, code: u8) -> (u8, Direction) {
        match self {
            Mode::FullStep => full_step(state, code),
            Mode::Difference => difference(state, code),
        }
    }
}

pub const START: u8 = 0x0;
const CW_FINAL: u8 = 0x1;
const CW_BEGIN: u8 = 0x2;
const CW_NEXT: u8 = 0x3;
const CCW_BEGIN: u8 = 0x4;
const CCW_FINAL: u8 = 0x5;
const CCW_NEXT: u8 = 0x6;

// Set on the cell that closes a full cycle.
const DIR_CCW: u8 = 0x10;
const DIR_CW: u8 = 0x20;

const STATE_MASK: u8 = 0xf;

// Rows are states, columns the incoming AB code.
const FULL_STEP_TABLE: [[u8; 4]; 7] = [
    // START
    [START, CCW_BEGIN, CW_BEGIN, START],
    // CW_FINAL
    [START | DIR_CW, CW_FINAL, START, CW_NEXT],
    // CW_BEGIN
    [START, START, CW_BEGIN, CW_NEXT],
    // CW_NEXT
    [START, CW_FINAL, CW_BEGIN, CW_NEXT],
    // CCW_BEGIN
    [START, CCW_BEGIN, START, CCW_NEXT],
    // CCW_FINAL
    [START | DIR_CCW, START, CCW_FINAL, CCW_NEXT],
    // CCW_NEXT
    [START, CCW_BEGIN, CCW_FINAL, CCW_NEXT],
];

/// Number of legal full step states.
pub const FULL_STEP_STATES: u8 = FULL_STEP_TABLE.len() as u8;

/// Combine the two channel levels into a 2-bit code. Any non-zero level is high.
pub fn channel_code(a: u8, b: u8) -> u8 {
    ((a != 0) as u8) << 1 | (b != 0) as u8
}

/// Full step state machine transition.
///
/// # Panics
///
/// If `state` is not one of the table rows or `code` is wider than two bits.
/// Neither can be produced by this module, so reaching it means a logic bug.
pub fn full_step(state: u8, code: u8) -> (u8, Direction) {
    let row = FULL_STEP_TABLE
        .get((state & STATE_MASK) as usize)
        .unwrap_or_else(|| panic!("encoder state {:#x} outside the transition table", state));
    let next = *row
        .get(code as usize)
        .unwrap_or_else(|| panic!("channel code {:#b} is wider than two bits", code));

    let direction = match next & (DIR_CW | DIR_CCW) {
        DIR_CW => Direction::Clockwise,
        DIR_CCW => Direction::CounterClockwise,
        _ => Direction::None,
    };

    (next & STATE_MASK, direction)
}

/// Difference lookup transition. The new state is always the current code.
///
/// # Panics
///
/// If either `last` or `code` is wider than two bits.
pub fn difference(last: u8, code: u8) -> (u8, Direction) {
    if last > 0b11 || code > 0b11 {
        panic!(
            "difference decoder got last {:#b} / code {:#b}, both must fit two bits",
            last, code
        );
    }
    (code, ((last << 2) | code).into())
}

/// Decoder state for one encoder. Not synchronized: callers serialize edges
/// themselves, `Encoder` does it with its guard.
#[derive(Debug, Clone)]
pub struct Decoder {
    mode: Mode,
    state: u8,
}

impl Decoder {
    pub fn new(mode: Mode) -> Self {
        Self::resume(mode, START)
    }

    /// Continue from a previously stored state.
    pub fn resume(mode: Mode, state: u8) -> Self {
        Self { mode, state }
    }

    pub fn decode(&mut self, a: u8, b: u8) -> Direction {
        let (state, direction) = self.mode.step(self.state, channel_code(a, b));
        self.state = state;
        direction
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> u8 {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = START;
    }
}
