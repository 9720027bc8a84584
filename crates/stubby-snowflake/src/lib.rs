mod clock;
pub mod error;
mod layout;
mod snowflake;

pub use clock::{Clock, SystemClock};
pub use error::Error;
pub use layout::{SnowflakeId, SnowflakeLayout, SnowflakeParts};
pub use snowflake::{Snowflake, SnowflakeSettings, DEFAULT_EPOCH};
