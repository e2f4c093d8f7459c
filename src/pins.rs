//! Raspberry Pi header pin numbering.
//!
//! The encoder is configured with BCM GPIO numbers. Each one is checked against
//! the wiringPi numbering table, see http://wiringpi.com/pins/
use log::warn;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PinAssignment {
    pub gpio: u64,
    pub wiring_pi: u8,
}

impl Channel {
    /// Pin used when the configured GPIO is not on the header.
    pub fn default_assignment(self) -> PinAssignment {
        match self {
            Channel::A => PinAssignment {
                gpio: 23,
                wiring_pi: 4,
            },
            Channel::B => PinAssignment {
                gpio: 24,
                wiring_pi: 5,
            },
        }
    }
}

// (BCM GPIO, wiringPi). Rev. 1 and Rev. 2 boards route some pins differently,
// both variants are listed. BCM 21 keeps its Rev. 1 number.
const WIRING_PI: [(u64, u8); 32] = [
    (0, 8),  // Rev. 1
    (1, 9),  // Rev. 1
    (2, 8),  // Rev. 2
    (3, 9),  // Rev. 2
    (4, 7),
    (7, 11),
    (8, 10),
    (9, 13),
    (10, 12),
    (11, 14),
    (14, 15),
    (15, 16),
    (17, 0),
    (18, 1),
    (21, 2), // Rev. 1
    (22, 3),
    (23, 4),
    (24, 5),
    (25, 6),
    (27, 2), // Rev. 2
    (28, 17),
    (29, 18),
    (30, 19),
    (31, 20),
    // 40-pin header, B+ and later
    (5, 21),
    (6, 22),
    (13, 23),
    (19, 24),
    (26, 25),
    (12, 26),
    (16, 27),
    (20, 28),
];

/// wiringPi number for a BCM GPIO, if the GPIO is on the header.
pub fn wiring_pi(gpio: u64) -> Option<u8> {
    WIRING_PI
        .iter()
        .find(|(g, _)| *g == gpio)
        .map(|(_, w)| *w)
}

/// Resolve the GPIO for a channel, falling back to the channel default with a
/// warning when it is unknown.
pub fn resolve(gpio: u64, channel: Channel) -> PinAssignment {
    match wiring_pi(gpio) {
        Some(wiring_pi) => PinAssignment { gpio, wiring_pi },
        None => {
            let fallback = channel.default_assignment();
            warn!(
                "GPIO {} is not a header pin, channel {:?} set to default GPIO {}",
                gpio, channel, fallback.gpio
            );
            fallback
        }
    }
}
