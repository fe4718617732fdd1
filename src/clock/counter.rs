use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{ClockReading, LatencyTimer};
use crate::error::Error;

const REGION_ALIGN: usize = 64;

/// Check up front whether a shared counter clock can work here: it needs
/// threads sharing memory and 64-bit atomics. A single hardware thread still
/// works, the counter just advances in scheduler-sized steps.
pub fn check_support(enabled: bool) -> Result<(), String> {
    if !enabled {
        return Err("disabled by configuration".into());
    }
    if !cfg!(all(target_os = "linux", target_has_atomic = "64")) {
        return Err("requires Linux with 64-bit atomics".into());
    }
    match std::thread::available_parallelism() {
        Ok(n) if n.get() >= 2 => {}
        Ok(_) => log::warn!(
            target: "cachetimer::counter",
            "only one hardware thread, counter resolution will be coarse"
        ),
        Err(e) => log::warn!(
            target: "cachetimer::counter",
            "cannot determine available parallelism: {}",
            e
        ),
    }
    Ok(())
}

/// Shared-memory counter clock.
///
/// A dedicated thread increments a counter in a cache-line aligned region as
/// fast as it can and the sampling thread reads it with a single atomic load.
/// The increment loop never checks a stop flag. `stop` cancels the thread
/// asynchronously, joins it, and only then releases the region.
///
/// The region is allocated exactly while the thread is running.
pub struct SharedCounterClock {
    region: NonNull<u8>,
    layout: Layout,
    thread: Option<libc::pthread_t>,
}

impl SharedCounterClock {
    /// Allocate the shared region and start the incrementing thread.
    ///
    /// Returns only once the thread has made its first increment, so `read`
    /// is meaningful immediately. A thread that does not get that far within
    /// `startup_timeout` is torn down and reported as unsupported.
    pub fn start(region_bytes: usize, startup_timeout: Duration) -> Result<Self, Error> {
        let layout = Layout::from_size_align(region_bytes.max(8), REGION_ALIGN)
            .map_err(|e| Error::InvalidConfig(format!("counter region: {}", e)))?;

        // SAFETY: layout size is at least 8 bytes.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let region = match NonNull::new(raw) {
            Some(p) => p,
            None => alloc::handle_alloc_error(layout),
        };

        // SAFETY: as in `counter`; nothing else holds the region yet.
        let counter = unsafe { &*(region.as_ptr() as *const AtomicU64) };
        let thread = match sys::spawn_incrementer(counter) {
            Ok(t) => t,
            Err(e) => {
                // SAFETY: allocated above with `layout`, never shared.
                unsafe { alloc::dealloc(region.as_ptr(), layout) };
                return Err(e);
            }
        };

        let clock = SharedCounterClock {
            region,
            layout,
            thread: Some(thread),
        };
        clock.await_first_increment(startup_timeout)?;

        log::debug!(
            target: "cachetimer::counter",
            "counter thread running, region={}B",
            layout.size(),
        );
        Ok(clock)
    }

    fn counter(&self) -> &AtomicU64 {
        debug_assert!(self.thread.is_some());
        // SAFETY: while the thread runs the region is allocated, 64-byte
        // aligned, zero-initialised and at least 8 bytes long.
        unsafe { &*(self.region.as_ptr() as *const AtomicU64) }
    }

    fn await_first_increment(&self, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        while self.counter().load(Ordering::Acquire) == 0 {
            if Instant::now() >= deadline {
                return Err(Error::Unsupported(format!(
                    "counter thread did not start within {}ms",
                    timeout.as_millis()
                )));
            }
            std::thread::yield_now();
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    pub fn region_bytes(&self) -> usize {
        self.layout.size()
    }

    /// Current counter value.
    ///
    /// # Panics
    ///
    /// Panics if the clock has been stopped.
    #[inline]
    pub fn read(&self) -> ClockReading {
        assert!(self.is_running(), "shared counter clock read after stop");
        ClockReading::new(self.counter().load(Ordering::SeqCst))
    }

    /// Cancel and join the incrementing thread, then release the region.
    ///
    /// # Panics
    ///
    /// Panics if the clock has already been stopped.
    pub fn stop(&mut self) {
        match self.teardown() {
            Some(increments) => log::debug!(
                target: "cachetimer::counter",
                "counter thread stopped after {} increments",
                increments,
            ),
            None => panic!("shared counter clock stopped twice"),
        }
    }

    /// Returns the final counter value, or `None` if already torn down.
    fn teardown(&mut self) -> Option<u64> {
        let thread = self.thread.take()?;
        sys::cancel_and_join(thread);
        // SAFETY: the incrementing thread, the only other user of the region,
        // has been joined; `layout` is the one the region was allocated with.
        let last = unsafe {
            let last = (*(self.region.as_ptr() as *const AtomicU64)).load(Ordering::Relaxed);
            alloc::dealloc(self.region.as_ptr(), self.layout);
            last
        };
        Some(last)
    }
}

impl Drop for SharedCounterClock {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl LatencyTimer for SharedCounterClock {
    type Mark = ClockReading;

    #[inline]
    fn begin(&self) -> ClockReading {
        self.read()
    }

    #[inline]
    fn finish(&self, start: ClockReading) -> u64 {
        self.read() - start
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::mem::MaybeUninit;
    use std::os::raw::{c_int, c_void};
    use std::ptr;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::error::Error;

    // Same value on glibc and musl.
    const PTHREAD_CANCEL_ASYNCHRONOUS: c_int = 1;

    extern "C" {
        fn pthread_setcanceltype(kind: c_int, old: *mut c_int) -> c_int;
        fn pthread_cancel(thread: libc::pthread_t) -> c_int;
    }

    /// Thread body: switch to asynchronous cancellation, publish the first
    /// increment, then increment forever. Holds nothing that needs dropping,
    /// so it can be cancelled at any instruction.
    extern "C" fn increment_forever(arg: *mut c_void) -> *mut c_void {
        // SAFETY: `arg` is the counter word of a region that is released only
        // after this thread has been joined.
        let counter = unsafe { &*(arg as *const AtomicU64) };
        let mut old: c_int = 0;
        unsafe {
            pthread_setcanceltype(PTHREAD_CANCEL_ASYNCHRONOUS, &mut old);
        }
        counter.fetch_add(1, Ordering::Release);
        loop {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn spawn_incrementer(counter: &AtomicU64) -> Result<libc::pthread_t, Error> {
        let mut thread = MaybeUninit::<libc::pthread_t>::uninit();
        let arg = counter as *const AtomicU64 as *mut c_void;
        let ret =
            unsafe { libc::pthread_create(thread.as_mut_ptr(), ptr::null(), increment_forever, arg) };
        if ret != 0 {
            return Err(std::io::Error::from_raw_os_error(ret).into());
        }
        // SAFETY: pthread_create succeeded and wrote the thread id.
        Ok(unsafe { thread.assume_init() })
    }

    pub fn cancel_and_join(thread: libc::pthread_t) {
        unsafe {
            pthread_cancel(thread);
            libc::pthread_join(thread, ptr::null_mut());
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::sync::atomic::AtomicU64;

    use crate::error::Error;

    pub fn spawn_incrementer(_counter: &AtomicU64) -> Result<libc::pthread_t, Error> {
        Err(Error::Unsupported(
            "shared counter clock requires Linux".into(),
        ))
    }

    pub fn cancel_and_join(_thread: libc::pthread_t) {}
}
