use super::coarse::CoarseClock;
use super::LatencyTimer;

/// Clock-edge interpolation over a coarse clock.
///
/// A coarse clock only tells which tick we are in. Counting how many
/// busy-loop increments still fit before the next edge recovers sub-tick
/// information: the fewer increments, the more of the tick was already used.
pub struct InterpolationClock<C> {
    coarse: C,
}

impl<C: CoarseClock> InterpolationClock<C> {
    pub fn new(coarse: C) -> Self {
        Self { coarse }
    }

    pub fn coarse(&self) -> &C {
        &self.coarse
    }

    /// Spin until the coarse clock moves past the value seen on entry and
    /// return the new value. Blocks for up to one tick; there is no timeout.
    pub fn wait_for_edge(&self) -> u64 {
        let last = self.coarse.now();
        loop {
            let now = self.coarse.now();
            if now != last {
                return now;
            }
        }
    }

    /// Count increments until the coarse clock changes again.
    pub fn count_edge(&self) -> u64 {
        let last = self.coarse.now();
        let mut count: u64 = 0;
        while self.coarse.now() == last {
            count += 1;
        }
        count
    }
}

/// Samples taken through this binding shrink as the timed operation grows.
impl<C: CoarseClock> LatencyTimer for InterpolationClock<C> {
    type Mark = u64;

    #[inline]
    fn begin(&self) -> u64 {
        self.wait_for_edge()
    }

    #[inline]
    fn finish(&self, _edge: u64) -> u64 {
        self.count_edge()
    }
}
