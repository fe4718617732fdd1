use std::hint::black_box;
use std::io::{self, Write};
use std::time::Duration;

use crate::cli::{DistributionArgs, TimersArgs};
use crate::clock::coarse::{Coarse, CoarseClock};
use crate::clock::counter::SharedCounterClock;
use crate::clock::interpolation::InterpolationClock;
use crate::clock::Capabilities;
use crate::config::{ClockConfig, ClockKind};
use crate::error::Error;
use crate::output;
use crate::report::DistributionReport;
use crate::stats::{self, Summary};

// ---------------------------------------------------------------------------
// Reference cycle counter
// ---------------------------------------------------------------------------

/// Serialized timestamp counter read.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn cycles() -> u64 {
    use core::arch::x86_64::{_mm_lfence, _rdtsc};
    // SAFETY: lfence and rdtsc are available on every x86_64 CPU.
    unsafe {
        _mm_lfence();
        let t = _rdtsc();
        _mm_lfence();
        t
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub fn cycles() -> u64 {
    crate::clock::coarse::clock_gettime_ns(libc::CLOCK_MONOTONIC)
}

pub fn cycle_unit() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "cycles"
    } else {
        "ns"
    }
}

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

/// Increments counted over `n` full coarse periods.
pub fn tick_distribution<C: CoarseClock>(clock: &InterpolationClock<C>, n: usize) -> Vec<u64> {
    let mut samples = Vec::with_capacity(n);
    for _ in 0..n {
        clock.wait_for_edge();
        samples.push(clock.count_edge());
    }
    samples
}

/// Cost of two back-to-back cycle counter reads.
pub fn measure_overhead(n: usize) -> Vec<u64> {
    (0..n)
        .map(|_| {
            let start = cycles();
            let end = cycles();
            end.wrapping_sub(start)
        })
        .collect()
}

/// Cycles spent counting from a tick edge to the next one, i.e. the cost of
/// one interpolated measurement once the starting edge has been found.
pub fn measure_interpolation<C: CoarseClock>(clock: &InterpolationClock<C>, n: usize) -> Vec<u64> {
    (0..n)
        .map(|_| {
            clock.wait_for_edge();
            let start = cycles();
            black_box(clock.count_edge());
            cycles().wrapping_sub(start)
        })
        .collect()
}

pub fn measure_counter_read(clock: &SharedCounterClock, n: usize) -> Vec<u64> {
    (0..n)
        .map(|_| {
            let start = cycles();
            black_box(clock.read());
            cycles().wrapping_sub(start)
        })
        .collect()
}

/// Cycles until the shared counter is seen to change.
pub fn measure_counter_increment(clock: &SharedCounterClock, n: usize) -> Vec<u64> {
    (0..n)
        .map(|_| {
            let seen = clock.read();
            let start = cycles();
            while clock.read() == seen {}
            cycles().wrapping_sub(start)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Characterization {
    /// Average with the cycle counter overhead subtracted.
    pub average: f64,
    pub std_dev: f64,
    pub median: f64,
}

impl Characterization {
    fn corrected(summary: &Summary, overhead: f64) -> Self {
        Self {
            average: (summary.average - overhead).max(0.0),
            std_dev: summary.std_dev,
            median: summary.median,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerRow {
    pub name: &'static str,
    pub result: Result<Characterization, String>,
}

impl TimerRow {
    fn measured(name: &'static str, samples: &[u64], overhead: f64) -> Result<Self, Error> {
        let summary = stats::summarize(samples)?;
        Ok(Self {
            name,
            result: Ok(Characterization::corrected(&summary, overhead)),
        })
    }

    fn unavailable(name: &'static str, reason: &str) -> Self {
        Self {
            name,
            result: Err(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerReport {
    pub unit: &'static str,
    pub samples: usize,
    pub overhead: Summary,
    pub rows: Vec<TimerRow>,
}

impl TimerReport {
    pub fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "Timer characterization: {} samples, unit {}",
            self.samples, self.unit
        )?;
        writeln!(
            out,
            "Reference overhead: avg {:.2}  std dev {:.2}  median {:.1}",
            self.overhead.average, self.overhead.std_dev, self.overhead.median
        )?;
        writeln!(out)?;
        writeln!(
            out,
            "{:<20} {:>12} {:>12} {:>12}",
            "Timer", "Average", "Std dev", "Median"
        )?;
        for row in &self.rows {
            match &row.result {
                Ok(c) => writeln!(
                    out,
                    "{:<20} {:>12.2} {:>12.2} {:>12.1}",
                    row.name, c.average, c.std_dev, c.median
                )?,
                Err(reason) => writeln!(out, "{:<20} unavailable ({})", row.name, reason)?,
            }
        }
        Ok(())
    }
}

/// Measure every timing primitive `n` times, in reference cycles.
///
/// Covers how finely the interpolation clock resolves a coarse tick and what
/// the shared counter costs to read and how often it moves.
pub fn characterize(
    clock_cfg: &ClockConfig,
    capabilities: &Capabilities,
    n: usize,
) -> Result<TimerReport, Error> {
    if n == 0 {
        return Err(Error::InvalidArgs("sample count must be greater than 0".into()));
    }

    let overhead = stats::summarize(&measure_overhead(n))?;
    let mut rows = Vec::with_capacity(3);

    let interpolation = InterpolationClock::new(Coarse::from_config(clock_cfg));
    rows.push(TimerRow::measured(
        "interpolation",
        &measure_interpolation(&interpolation, n),
        overhead.average,
    )?);

    match capabilities.require(ClockKind::SharedCounter) {
        Ok(()) => {
            let mut counter = SharedCounterClock::start(
                clock_cfg.counter_region_bytes,
                Duration::from_millis(clock_cfg.counter_startup_timeout_ms),
            )?;
            let reads = measure_counter_read(&counter, n);
            let increments = measure_counter_increment(&counter, n);
            counter.stop();
            rows.push(TimerRow::measured("counter read", &reads, overhead.average)?);
            rows.push(TimerRow::measured(
                "counter increment",
                &increments,
                overhead.average,
            )?);
        }
        Err(e) => {
            let reason = e.to_string();
            log::info!("{}", reason);
            rows.push(TimerRow::unavailable("counter read", &reason));
            rows.push(TimerRow::unavailable("counter increment", &reason));
        }
    }

    Ok(TimerReport {
        unit: cycle_unit(),
        samples: n,
        overhead,
        rows,
    })
}

pub fn run_timers(args: &TimersArgs, clock_cfg: &ClockConfig) -> Result<(), Error> {
    let capabilities = Capabilities::detect(clock_cfg);
    let report = characterize(clock_cfg, &capabilities, args.samples)?;
    output::with_output(args.output_file.as_deref(), |out| report.write(out))?;
    Ok(())
}

pub fn run_distribution(args: &DistributionArgs, clock_cfg: &ClockConfig) -> Result<(), Error> {
    if args.count == 0 {
        return Err(Error::InvalidArgs("sample count must be greater than 0".into()));
    }
    let coarse = Coarse::from_config(clock_cfg);
    log::info!("measuring {} periods of {}", args.count, coarse.describe());

    let clock = InterpolationClock::new(coarse);
    let samples = tick_distribution(&clock, args.count);
    let report = DistributionReport::build(coarse.describe(), coarse.resolution_ns(), samples)?;

    output::with_output(args.output_file.as_deref(), |out| {
        if args.raw {
            report.write_lines(out)
        } else {
            report.write_summary(out)
        }
    })?;
    Ok(())
}
