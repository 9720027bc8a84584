use jiff::Timestamp;
use std::time::Duration;

pub trait Clock: Send + Sync {
    /// Returns the current time of the clock
    fn now(&self) -> Timestamp;
    /// Block and wait until the clock reaches the target time.
    ///
    /// This is a blocking wait on the calling thread, also when called from
    /// an async task. [`Snowflake`](crate::Snowflake) only waits for the next
    /// millisecond, so the thread is held for at most about one millisecond.
    fn wait_until(&self, target: Timestamp);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    fn wait_until(&self, target: Timestamp) {
        // Sleep while whole milliseconds remain, then spin on the last one.
        loop {
            let now = Timestamp::now();
            if now >= target {
                return;
            }
            let remaining = now.duration_until(target);
            match Duration::try_from(remaining) {
                Ok(remaining) if remaining >= Duration::from_millis(1) => {
                    std::thread::sleep(remaining)
                }
                _ => std::thread::yield_now(),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use crate::clock::Clock;
    use jiff::Timestamp;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    pub(crate) struct TestClock {
        inner: Arc<Mutex<TestClockState>>,
    }

    struct TestClockState {
        now: Timestamp,
    }

    impl TestClock {
        pub(crate) fn new(now: Timestamp) -> Self {
            Self {
                inner: Arc::new(Mutex::new(TestClockState { now })),
            }
        }

        pub(crate) fn from_millis(millis: i64) -> Self {
            Self::new(Timestamp::from_millisecond(millis).unwrap())
        }

        /// Moves the clock to an arbitrary time, backwards included.
        pub(crate) fn set_millis(&self, millis: i64) {
            self.inner
                .lock()
                .expect("test clock lock should not be poisoned")
                .now = Timestamp::from_millisecond(millis).unwrap();
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Timestamp {
            self.inner
                .lock()
                .expect("test clock lock should not be poisoned")
                .now
        }

        fn wait_until(&self, target: Timestamp) {
            let mut state = self
                .inner
                .lock()
                .expect("test clock lock should not be poisoned");
            // frozen clock: only a wait moves it forward
            if target > state.now {
                state.now = target;
            }
        }
    }

    #[test]
    fn test_clock_works() {
        let clock = TestClock::from_millis(0);
        assert_eq!(clock.now().as_millisecond(), 0);

        let target = Timestamp::from_millisecond(1_500).unwrap();
        clock.wait_until(target);
        assert_eq!(clock.now(), target);

        clock.set_millis(10);
        assert_eq!(clock.now().as_millisecond(), 10);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_waits_for_target() {
        let clock = SystemClock;
        let target = clock.now() + jiff::SignedDuration::from_millis(3);
        clock.wait_until(target);
        assert!(clock.now() >= target);
    }
}
