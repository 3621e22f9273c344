//! Time-ordered 64-bit identifiers.
//!
//! Layout from the most significant bit down: 42 bits of milliseconds since an
//! [`Epoch`], a 5 bit worker id, a 5 bit process id and a 12 bit increment
//! owned by the generator. Ids minted later compare greater, which the post
//! listing relies on to break ties between equal creation times.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_BITS: u32 = 42;
pub const WORKER_ID_BITS: u32 = 5;
pub const PROCESS_ID_BITS: u32 = 5;
pub const INCREMENT_BITS: u32 = 12;

const INCREMENT_SHIFT: u32 = 0;
const PROCESS_ID_SHIFT: u32 = INCREMENT_SHIFT + INCREMENT_BITS;
const WORKER_ID_SHIFT: u32 = PROCESS_ID_SHIFT + PROCESS_ID_BITS;
const TIMESTAMP_SHIFT: u32 = WORKER_ID_SHIFT + WORKER_ID_BITS;

const fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimeError {
    #[error("Time was before the snowflake epoch.")]
    BeforeEpoch,
    #[error("Time is too far past the snowflake epoch to be encoded.")]
    TooLate,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("{name} {value} does not fit in {bits} bits")]
pub struct PartOutOfRangeError {
    name: &'static str,
    value: u64,
    bits: u32,
}

macro_rules! bounded_part {
    ($(#[$meta:meta])* $name:ident($repr:ty), bits = $bits:expr) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            #[allow(clippy::cast_possible_truncation)]
            pub const MAX: $repr = mask($bits) as $repr;

            #[must_use]
            pub fn new(value: $repr) -> Option<Self> {
                (value <= Self::MAX).then_some(Self(value))
            }

            #[must_use]
            pub fn get(self) -> $repr {
                self.0
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = PartOutOfRangeError;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(PartOutOfRangeError {
                    name: stringify!($name),
                    value: value.into(),
                    bits: $bits,
                })
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let value = <$repr>::deserialize(deserializer)?;
                Self::try_from(value).map_err(D::Error::custom)
            }
        }
    };
}

bounded_part!(
    /// Identifies the machine minting ids.
    WorkerId(u8),
    bits = WORKER_ID_BITS
);
bounded_part!(
    /// Identifies the process on a worker minting ids.
    ProcessId(u8),
    bits = PROCESS_ID_BITS
);

/// Milliseconds between the epoch and `time`, if they fit the timestamp field.
pub fn millis_since_epoch<SnowflakeEpoch: Epoch>(
    time: UtcDateTime,
) -> Result<u64, SnowflakeTimeError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    let millis = u64::try_from(millis).map_err(|_| {
        if millis < 0 {
            SnowflakeTimeError::BeforeEpoch
        } else {
            SnowflakeTimeError::TooLate
        }
    })?;

    if millis > mask(TIMESTAMP_BITS) {
        return Err(SnowflakeTimeError::TooLate);
    }
    Ok(millis)
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    /// Packs the parts; bits of `timestamp_millis` and `increment` beyond their
    /// field widths are dropped.
    #[must_use]
    pub fn from_parts(
        timestamp_millis: u64,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: u16,
    ) -> Self {
        Self::new(
            (timestamp_millis & mask(TIMESTAMP_BITS)) << TIMESTAMP_SHIFT
                | u64::from(worker_id.get()) << WORKER_ID_SHIFT
                | u64::from(process_id.get()) << PROCESS_ID_SHIFT
                | (u64::from(increment) & mask(INCREMENT_BITS)) << INCREMENT_SHIFT,
        )
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp_millis(self) -> u64 {
        self.field(TIMESTAMP_SHIFT, TIMESTAMP_BITS)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn worker_id(self) -> WorkerId {
        WorkerId(self.field(WORKER_ID_SHIFT, WORKER_ID_BITS) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn process_id(self) -> ProcessId {
        ProcessId(self.field(PROCESS_ID_SHIFT, PROCESS_ID_BITS) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn increment(self) -> u16 {
        self.field(INCREMENT_SHIFT, INCREMENT_BITS) as u16
    }

    #[must_use]
    pub fn minted_at(self) -> UtcDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        // 42 bits of milliseconds always fit an i64.
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(self.timestamp_millis().cast_signed())
    }

    fn field(self, shift: u32, bits: u32) -> u64 {
        (self.0 >> shift) & mask(bits)
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    next_increment: u16,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch: Epoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            next_increment: 0,
            phantom_data: PhantomData,
        }
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimeError> {
        let millis = millis_since_epoch::<SnowflakeEpoch>(time)?;
        let increment = self.next_increment;
        #[allow(clippy::cast_possible_truncation)]
        {
            self.next_increment = ((u64::from(increment) + 1) & mask(INCREMENT_BITS)) as u16;
        }

        Ok(Snowflake::from_parts(
            millis,
            self.worker_id,
            self.process_id,
            increment,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimeError> {
        self.generate_at(UtcDateTime::now())
    }
}
