use crate::config::{ClockConfig, CoarseSource};

/// A monotonic clock whose reported value only changes at tick edges.
pub trait CoarseClock {
    fn now(&self) -> u64;
}

/// Coarse clocks available on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coarse {
    /// CLOCK_MONOTONIC_COARSE, in nanoseconds.
    Kernel,
    /// CLOCK_MONOTONIC divided down to `resolution_ns` ticks.
    Quantized { resolution_ns: u64 },
}

impl Coarse {
    pub fn from_config(config: &ClockConfig) -> Self {
        match config.coarse {
            CoarseSource::Kernel => Coarse::Kernel,
            CoarseSource::Quantized => Coarse::Quantized {
                resolution_ns: config.resolution_ns.max(1),
            },
        }
    }

    /// Nominal tick period in nanoseconds.
    pub fn resolution_ns(&self) -> u64 {
        match self {
            Coarse::Kernel => clock_getres_ns(libc::CLOCK_MONOTONIC_COARSE),
            Coarse::Quantized { resolution_ns } => *resolution_ns,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Coarse::Kernel => format!(
                "CLOCK_MONOTONIC_COARSE ({}ns ticks)",
                self.resolution_ns()
            ),
            Coarse::Quantized { resolution_ns } => {
                format!("CLOCK_MONOTONIC quantized to {}ns", resolution_ns)
            }
        }
    }
}

impl CoarseClock for Coarse {
    #[inline]
    fn now(&self) -> u64 {
        match self {
            Coarse::Kernel => clock_gettime_ns(libc::CLOCK_MONOTONIC_COARSE),
            Coarse::Quantized { resolution_ns } => {
                clock_gettime_ns(libc::CLOCK_MONOTONIC) / resolution_ns
            }
        }
    }
}

pub fn clock_gettime_ns(clock: libc::clockid_t) -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(clock, &mut ts);
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}

fn clock_getres_ns(clock: libc::clockid_t) -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let ret = unsafe { libc::clock_getres(clock, &mut ts) };
    if ret != 0 {
        return 0;
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}
