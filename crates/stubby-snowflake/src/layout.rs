use crate::error::Error;
use std::fmt;
use typed_builder::TypedBuilder;

/// Bit widths of the four Snowflake fields, most significant first.
///
/// The sign bit is always left clear, so the widths may sum to at most 63.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct SnowflakeLayout {
    #[builder(default = 41)]
    pub timestamp_bits: u8,
    #[builder(default = 5)]
    pub datacenter_bits: u8,
    #[builder(default = 5)]
    pub worker_bits: u8,
    #[builder(default = 12)]
    pub sequence_bits: u8,
}

impl Default for SnowflakeLayout {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1_u64 << bits) - 1
    }
}

impl SnowflakeLayout {
    pub fn validate(&self) -> Result<(), Error> {
        if self.timestamp_bits == 0 || self.sequence_bits == 0 {
            return Err(Error::InvalidLayout(
                "timestamp and sequence need at least one bit each".to_string(),
            ));
        }

        let total = u32::from(self.timestamp_bits)
            + u32::from(self.datacenter_bits)
            + u32::from(self.worker_bits)
            + u32::from(self.sequence_bits);
        if total > 63 {
            return Err(Error::InvalidLayout(format!(
                "fields use {total} bits; at most 63 fit in a positive i64"
            )));
        }

        Ok(())
    }

    pub fn max_timestamp(&self) -> u64 {
        mask(self.timestamp_bits)
    }

    pub fn max_datacenter_id(&self) -> u64 {
        mask(self.datacenter_bits)
    }

    pub fn max_worker_id(&self) -> u64 {
        mask(self.worker_bits)
    }

    pub fn max_sequence(&self) -> u64 {
        mask(self.sequence_bits)
    }

    /// How far an id moves when its timestamp advances by one millisecond.
    pub fn millisecond_stride(&self) -> u64 {
        1_u64 << self.timestamp_shift()
    }

    fn worker_shift(&self) -> u8 {
        self.sequence_bits
    }

    fn datacenter_shift(&self) -> u8 {
        self.sequence_bits + self.worker_bits
    }

    fn timestamp_shift(&self) -> u8 {
        self.sequence_bits + self.worker_bits + self.datacenter_bits
    }

    /// Packs the fields into an id. Callers keep each field within its width.
    pub(crate) fn compose(&self, parts: SnowflakeParts) -> SnowflakeId {
        SnowflakeId(
            (parts.timestamp << self.timestamp_shift())
                | (parts.datacenter_id << self.datacenter_shift())
                | (parts.worker_id << self.worker_shift())
                | parts.sequence,
        )
    }

    pub fn decompose(&self, id: SnowflakeId) -> SnowflakeParts {
        let raw = id.0;
        SnowflakeParts {
            timestamp: (raw >> self.timestamp_shift()) & self.max_timestamp(),
            datacenter_id: (raw >> self.datacenter_shift()) & self.max_datacenter_id(),
            worker_id: (raw >> self.worker_shift()) & self.max_worker_id(),
            sequence: raw & self.max_sequence(),
        }
    }
}

/// A generated 64-bit identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnowflakeId(u64);

impl SnowflakeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<SnowflakeId> for u64 {
    fn from(id: SnowflakeId) -> Self {
        id.0
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SnowflakeId").field(&self.0).finish()
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unpacked fields of a [`SnowflakeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeParts {
    /// Milliseconds since the generator's epoch.
    pub timestamp: u64,
    pub datacenter_id: u64,
    pub worker_id: u64,
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_classic_snowflake() {
        let layout = SnowflakeLayout::default();
        assert_eq!(layout.max_sequence(), 4095);
        assert_eq!(layout.max_worker_id(), 31);
        assert_eq!(layout.max_datacenter_id(), 31);
        assert_eq!(layout.max_timestamp(), (1 << 41) - 1);
        assert_eq!(layout.millisecond_stride(), 1 << 22);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn compose_and_decompose_agree() {
        let layout = SnowflakeLayout::default();
        let parts = SnowflakeParts {
            timestamp: 123_456_789,
            datacenter_id: 1,
            worker_id: 30,
            sequence: 4095,
        };
        let id = layout.compose(parts);
        assert_eq!(layout.decompose(id), parts);
        assert!(id.as_u64() < (1 << 63));
    }

    #[test]
    fn rejects_oversized_layout() {
        let layout = SnowflakeLayout::builder()
            .timestamp_bits(42)
            .sequence_bits(12)
            .build();
        assert!(matches!(layout.validate(), Err(Error::InvalidLayout(_))));
    }

    #[test]
    fn rejects_empty_sequence() {
        let layout = SnowflakeLayout::builder().sequence_bits(0).build();
        assert!(matches!(layout.validate(), Err(Error::InvalidLayout(_))));
    }
}
