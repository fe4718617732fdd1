use rand_core::RngCore;

use crate::error::Error;

/// Size of the unit a victim stands in for.
pub const CACHE_LINE: usize = 64;

/// Victim and eviction set values are drawn from `0..SMALL_VALUE_RANGE`.
pub const SMALL_VALUE_RANGE: i64 = 127;

pub const DEFAULT_WARM_REPETITIONS: u32 = 1000;

/// Floored modulo: the result takes the sign of `n`.
///
/// Panics if `n` is zero.
pub fn modulo(x: i64, n: i64) -> i64 {
    let m = x.wrapping_rem(n);
    if m != 0 && ((m < 0) != (n < 0)) {
        m + n
    } else {
        m
    }
}

/// Map a raw random byte, read as signed, into the small value range.
fn small_value(raw: u8) -> u8 {
    modulo(raw as i8 as i64, SMALL_VALUE_RANGE) as u8
}

#[repr(C, align(64))]
struct CacheLine([u8; CACHE_LINE]);

/// The resource whose cache residency is measured.
///
/// Each victim owns one cache line and an accumulator. The accumulator only
/// exists so that accesses are real memory reads.
pub struct Victim {
    line: Box<CacheLine>,
    address: usize,
    sum: u64,
}

impl Victim {
    pub fn new<R: RngCore>(rng: &mut R) -> Self {
        let address = modulo(rng.next_u32() as i32 as i64, CACHE_LINE as i64) as usize;
        let mut line = Box::new(CacheLine([0; CACHE_LINE]));
        line.0[address] = small_value(rng.next_u32() as u8);
        Self {
            line,
            address,
            sum: 0,
        }
    }

    #[cfg(test)]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Access the victim `repetitions` times to pull it into the cache.
    pub fn warm(&mut self, repetitions: u32) {
        for _ in 0..repetitions {
            self.access();
        }
    }

    #[inline(always)]
    pub fn access(&mut self) {
        let value = unsafe { std::ptr::read_volatile(&self.line.0[self.address]) };
        self.sum = self.sum.wrapping_add(value as u64);
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    #[cfg(test)]
    fn value(&self) -> u8 {
        self.line.0[self.address]
    }
}

/// Buffer larger than the target cache, traversed to displace the victim.
pub struct EvictionSet {
    buf: Vec<u8>,
}

impl EvictionSet {
    /// Fill a `size`-byte buffer with small random values. `size` must
    /// exceed `cache_size`, otherwise a traversal cannot be relied on to
    /// evict anything.
    pub fn generate<R: RngCore>(size: usize, cache_size: usize, rng: &mut R) -> Result<Self, Error> {
        if size <= cache_size {
            return Err(Error::InvalidConfig(format!(
                "eviction set size ({}B) must exceed cache size ({}B)",
                size, cache_size
            )));
        }
        let mut buf = vec![0u8; size];
        rng.fill_bytes(&mut buf);
        for b in buf.iter_mut() {
            *b = small_value(*b);
        }
        Ok(Self { buf })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Sequential pass incrementing every element once.
    pub fn evict(&mut self) {
        for v in self.buf.iter_mut() {
            *v = v.wrapping_add(1);
        }
        std::hint::black_box(&mut self.buf);
    }
}
