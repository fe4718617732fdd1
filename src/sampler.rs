use std::sync::atomic::{compiler_fence, Ordering};
use std::time::Duration;

use rand_chacha::ChaCha20Rng;
use serde::{Serialize, Serializer};

use crate::cache::{EvictionSet, Victim};
use crate::clock::coarse::Coarse;
use crate::clock::counter::SharedCounterClock;
use crate::clock::interpolation::InterpolationClock;
use crate::clock::{Capabilities, LatencyTimer};
use crate::config::{ClockConfig, ClockKind, SessionConfig};
use crate::error::Error;
use crate::rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Population {
    Hit,
    Miss,
}

impl Population {
    pub fn name(&self) -> &'static str {
        match self {
            Population::Hit => "hit",
            Population::Miss => "miss",
        }
    }
}

/// Latencies of one population, in measurement order.
#[derive(Debug, Clone)]
pub struct SampleSet {
    population: Population,
    samples: Vec<u64>,
}

impl SampleSet {
    pub fn with_capacity(population: Population, capacity: usize) -> Self {
        Self {
            population,
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn population(&self) -> Population {
        self.population
    }

    pub fn push(&mut self, sample: u64) {
        self.samples.push(sample);
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

impl Serialize for SampleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.samples)
    }
}

/// Output of one hit/miss session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub clock: ClockKind,
    pub hits: SampleSet,
    pub misses: SampleSet,
}

/// Where a single measurement currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Priming,
    Evicting,
    Waiting,
    Measuring,
    Done,
}

pub struct Sampler {
    session: SessionConfig,
    clock: ClockConfig,
    capabilities: Capabilities,
    rng: ChaCha20Rng,
    phase: Phase,
}

impl Sampler {
    pub fn new(
        session: SessionConfig,
        clock: ClockConfig,
        capabilities: Capabilities,
    ) -> Result<Self, Error> {
        let rng = rng::session_rng(session.seed)?;
        Ok(Self {
            session,
            clock,
            capabilities,
            rng,
            phase: Phase::Idle,
        })
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Measure `repetitions` hits followed by `repetitions` misses.
    ///
    /// The eviction set is generated once and reused for every miss. A shared
    /// counter clock is started for the session and stopped before returning.
    pub fn run_session(&mut self, kind: ClockKind, repetitions: usize) -> Result<Session, Error> {
        if repetitions == 0 {
            return Err(Error::InvalidConfig(
                "repetitions must be greater than 0".into(),
            ));
        }
        self.capabilities.require(kind)?;

        let mut eviction = EvictionSet::generate(
            self.session.eviction_set_size,
            self.session.cache_size,
            &mut self.rng,
        )?;

        log::info!(
            "session: clock={} repetitions={} eviction set={}B cache={}B",
            kind.name(),
            repetitions,
            eviction.len(),
            self.session.cache_size,
        );

        let (hits, misses) = match kind {
            ClockKind::Interpolation => {
                let timer = InterpolationClock::new(Coarse::from_config(&self.clock));
                log::debug!("coarse clock: {}", timer.coarse().describe());
                self.collect(&timer, &mut eviction, repetitions)
            }
            ClockKind::SharedCounter => {
                let mut counter = SharedCounterClock::start(
                    self.clock.counter_region_bytes,
                    Duration::from_millis(self.clock.counter_startup_timeout_ms),
                )?;
                log::debug!(
                    target: "cachetimer::counter",
                    "sampling with a {}B counter region",
                    counter.region_bytes()
                );
                let populations = self.collect(&counter, &mut eviction, repetitions);
                counter.stop();
                populations
            }
        };
        debug_assert_eq!(self.phase, Phase::Done);

        log::info!(
            "session done: {} hits, {} misses",
            hits.len(),
            misses.len()
        );

        Ok(Session {
            clock: kind,
            hits,
            misses,
        })
    }

    fn collect<T: LatencyTimer>(
        &mut self,
        timer: &T,
        eviction: &mut EvictionSet,
        repetitions: usize,
    ) -> (SampleSet, SampleSet) {
        let mut hits = SampleSet::with_capacity(Population::Hit, repetitions);
        for _ in 0..repetitions {
            let sample = self.measure_hit(timer);
            hits.push(sample);
        }

        let mut misses = SampleSet::with_capacity(Population::Miss, repetitions);
        for _ in 0..repetitions {
            let sample = self.measure_miss(timer, eviction);
            misses.push(sample);
        }

        (hits, misses)
    }

    /// Time an access to a victim that was just warmed into the cache.
    pub fn measure_hit<T: LatencyTimer>(&mut self, timer: &T) -> u64 {
        self.phase = Phase::Idle;
        let mut victim = Victim::new(&mut self.rng);

        self.phase = Phase::Priming;
        for _ in 0..self.session.prime_rounds {
            victim.warm(self.session.warm_repetitions);
        }

        self.time_access(timer, &mut victim)
    }

    /// Time an access to a victim right after a full eviction pass.
    pub fn measure_miss<T: LatencyTimer>(&mut self, timer: &T, eviction: &mut EvictionSet) -> u64 {
        self.phase = Phase::Idle;
        let mut victim = Victim::new(&mut self.rng);

        self.phase = Phase::Evicting;
        eviction.evict();

        self.time_access(timer, &mut victim)
    }

    #[inline(always)]
    fn time_access<T: LatencyTimer>(&mut self, timer: &T, victim: &mut Victim) -> u64 {
        self.phase = Phase::Waiting;
        let mark = timer.begin();

        self.phase = Phase::Measuring;
        compiler_fence(Ordering::SeqCst);
        victim.access();
        compiler_fence(Ordering::SeqCst);
        let latency = timer.finish(mark);
        std::hint::black_box(victim.sum());

        self.phase = Phase::Done;
        latency
    }
}
