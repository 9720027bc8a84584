use crate::{
    clock::{Clock, SystemClock},
    error::Error,
    layout::{SnowflakeId, SnowflakeLayout, SnowflakeParts},
};
use jiff::Timestamp;
use std::sync::Mutex;
use typed_builder::TypedBuilder;

/// 2021-01-01T00:00:00Z
pub const DEFAULT_EPOCH: Timestamp = Timestamp::constant(1_609_459_200, 0);

/// Configures a Snowflake generator instance.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct SnowflakeSettings {
    #[builder(default = 1)]
    pub datacenter_id: u64,
    #[builder(default = 1)]
    pub worker_id: u64,
    /// Zero point of the millisecond timestamp field.
    #[builder(default = DEFAULT_EPOCH)]
    pub epoch: Timestamp,
    #[builder(default)]
    pub layout: SnowflakeLayout,
}

impl Default for SnowflakeSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_millis: Option<i64>,
    sequence: u64,
}

/// Snowflake ID generator.
///
/// IDs from one instance are strictly increasing. A clock that moves
/// backwards is reported as [`Error::ClockRegression`] instead of waited out;
/// an exhausted per-millisecond sequence waits for the next millisecond.
pub struct Snowflake<C: Clock = SystemClock> {
    epoch_millis: i64,
    datacenter_id: u64,
    worker_id: u64,
    layout: SnowflakeLayout,
    clock: C,
    state: Mutex<GeneratorState>,
}

impl Snowflake<SystemClock> {
    /// Creates a generator backed by the real system clock.
    pub fn new(settings: SnowflakeSettings) -> Result<Self, Error> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> Snowflake<C> {
    pub fn with_clock(settings: SnowflakeSettings, clock: C) -> Result<Self, Error> {
        let layout = settings.layout;
        layout.validate()?;

        if settings.datacenter_id > layout.max_datacenter_id() {
            return Err(Error::InvalidNodeId {
                field: "datacenter id",
                id: settings.datacenter_id,
                max: layout.max_datacenter_id(),
            });
        }
        if settings.worker_id > layout.max_worker_id() {
            return Err(Error::InvalidNodeId {
                field: "worker id",
                id: settings.worker_id,
                max: layout.max_worker_id(),
            });
        }

        let now = clock.now();
        if settings.epoch > now {
            return Err(Error::EpochAhead {
                epoch: settings.epoch,
                now,
            });
        }

        Ok(Self {
            epoch_millis: settings.epoch.as_millisecond(),
            datacenter_id: settings.datacenter_id,
            worker_id: settings.worker_id,
            layout,
            clock,
            state: Mutex::new(GeneratorState::default()),
        })
    }

    pub fn layout(&self) -> &SnowflakeLayout {
        &self.layout
    }

    /// Generates the next unique id.
    ///
    /// When the sequence wraps within one millisecond this blocks the calling
    /// thread until the clock ticks over, see [`Clock::wait_until`].
    pub fn next_id(&self) -> Result<SnowflakeId, Error> {
        let mut state = self.state.lock().map_err(|_| Error::StatePoisoned)?;

        let mut now = self.clock.now().as_millisecond();

        match state.last_millis {
            None => state.sequence = 0,
            Some(last) if now < last => {
                return Err(Error::ClockRegression {
                    last_ms: last,
                    now_ms: now,
                });
            }
            Some(last) if now == last => {
                state.sequence = (state.sequence + 1) & self.layout.max_sequence();
                if state.sequence == 0 {
                    // Sequence exhausted for this millisecond.
                    now = self.wait_next_millis(last)?;
                }
            }
            Some(_) => state.sequence = 0,
        }

        let elapsed = now - self.epoch_millis;
        if elapsed < 0 {
            return Err(Error::ClockRegression {
                last_ms: self.epoch_millis,
                now_ms: now,
            });
        }
        if elapsed as u64 > self.layout.max_timestamp() {
            return Err(Error::OverTimeLimit);
        }

        state.last_millis = Some(now);

        Ok(self.layout.compose(SnowflakeParts {
            timestamp: elapsed as u64,
            datacenter_id: self.datacenter_id,
            worker_id: self.worker_id,
            sequence: state.sequence,
        }))
    }

    fn wait_next_millis(&self, last: i64) -> Result<i64, Error> {
        let target = Timestamp::from_millisecond(last + 1).map_err(|_| Error::OverTimeLimit)?;
        loop {
            self.clock.wait_until(target);
            let now = self.clock.now().as_millisecond();
            if now > last {
                return Ok(now);
            }
        }
    }
}
