/*! Time structures.

 - [Instant] is a point in time, as seen by the caller's clock.
 - [Duration] is a span between two instants.

Both count microseconds. The engine never reads a clock: every entry point
takes the current `Instant`, and every timer (neighbor reachability, DAD,
address and prefix lifetimes, reassembly expiry, the TCP tick) is an
`Instant` deadline stored in the entry it belongs to.
*/

use core::{fmt, ops};

/// A point in time, in microseconds since an arbitrary origin such as
/// system startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    micros: i64,
}

impl Instant {
    pub const ZERO: Instant = Instant { micros: 0 };

    pub fn from_micros<T: Into<i64>>(micros: T) -> Instant {
        Instant {
            micros: micros.into(),
        }
    }

    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant {
            micros: millis.into() * 1_000,
        }
    }

    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant {
            micros: secs.into() * 1_000_000,
        }
    }

    /// The millisecond part, below one second.
    pub const fn millis(&self) -> i64 {
        self.micros % 1_000_000 / 1_000
    }

    /// Whole seconds since the origin.
    pub const fn secs(&self) -> i64 {
        self.micros / 1_000_000
    }

    pub const fn total_micros(&self) -> i64 {
        self.micros
    }

    /// Time left until `deadline`, or zero if it has passed.
    pub fn until(&self, deadline: Instant) -> Duration {
        if deadline.micros > self.micros {
            Duration::from_micros((deadline.micros - self.micros) as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:0>3}s", self.secs(), self.millis())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Instant {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}.{:03}s", self.secs(), self.millis());
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    /// Deadlines far in the future (infinite lifetimes) clamp instead of
    /// wrapping.
    fn add(self, rhs: Duration) -> Instant {
        let micros = i64::try_from(rhs.micros).unwrap_or(i64::MAX);
        Instant::from_micros(self.micros.saturating_add(micros))
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros - rhs.micros as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_micros((self.micros - rhs.micros).unsigned_abs())
    }
}

/// A span of time, in microseconds.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    micros: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration::from_micros(0);

    pub const fn from_micros(micros: u64) -> Duration {
        Duration { micros }
    }

    pub const fn from_millis(millis: u64) -> Duration {
        Duration {
            micros: millis * 1_000,
        }
    }

    pub const fn from_secs(secs: u64) -> Duration {
        Duration {
            micros: secs * 1_000_000,
        }
    }

    /// The millisecond part, below one second.
    pub const fn millis(&self) -> u64 {
        self.micros / 1_000 % 1_000
    }

    pub const fn secs(&self) -> u64 {
        self.micros / 1_000_000
    }

    pub const fn total_millis(&self) -> u64 {
        self.micros / 1_000
    }

    pub const fn total_micros(&self) -> u64 {
        self.micros
    }

    /// Subtract, clamping at zero.
    pub const fn saturating_sub(self, rhs: Duration) -> Duration {
        Duration::from_micros(self.micros.saturating_sub(rhs.micros))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Duration {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}.{:03}s", self.secs(), self.millis());
    }
}

impl ops::Add<Duration> for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::from_micros(self.micros.saturating_add(rhs.micros))
    }
}

impl ops::Sub<Duration> for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_micros(
            self.micros
                .checked_sub(rhs.micros)
                .expect("overflow when subtracting durations"),
        )
    }
}

impl ops::Mul<u32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: u32) -> Duration {
        Duration::from_micros(self.micros.saturating_mul(rhs as u64))
    }
}
