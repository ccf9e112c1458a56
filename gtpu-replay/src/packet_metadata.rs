use std::cmp::min;
use std::fmt::{self, Display};

use chrono::DateTime;
use pcap_parser::{EnhancedPacketBlock, LegacyPcapBlock, SimplePacketBlock};

/// Capture time in nanoseconds since the epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampNsec(u64);

impl Display for TimestampNsec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nsecs = self.0 % 1_000_000_000;
        match DateTime::from_timestamp(secs as i64, nsecs as u32) {
            Some(date_time) if !f.alternate() => {
                write!(f, "{}", date_time.format("%Y-%m-%d %H:%M:%S%.6f UTC"))
            }
            _ => write!(f, "{}.{:09}", secs, nsecs),
        }
    }
}

/// The parts of a captured frame the replay loop needs, whatever the block
/// type it came from
pub trait PacketMetadata {
    fn caplen(&self) -> u32;
    fn data(&self) -> &[u8];
    fn timestamp(&self) -> TimestampNsec;
}

impl PacketMetadata for LegacyPcapBlock<'_> {
    #[inline]
    fn caplen(&self) -> u32 {
        self.caplen
    }

    #[inline]
    fn data(&self) -> &[u8] {
        self.data
    }

    #[inline]
    fn timestamp(&self) -> TimestampNsec {
        TimestampNsec(self.ts_sec as u64 * 1_000_000_000 + self.ts_usec as u64 * 1000)
    }
}

impl PacketMetadata for EnhancedPacketBlock<'_> {
    #[inline]
    fn caplen(&self) -> u32 {
        self.caplen
    }

    #[inline]
    fn data(&self) -> &[u8] {
        self.data
    }

    /// Interfaces usually stamp in microseconds; nanosecond captures are told
    /// apart by the magnitude of the value (1973..2096 when read as ns).
    #[inline]
    fn timestamp(&self) -> TimestampNsec {
        let raw_ts = ((self.ts_high as u64) << 32) | self.ts_low as u64;
        if (100_000_000..=4_000_000_000).contains(&(raw_ts / 1_000_000_000)) {
            TimestampNsec(raw_ts)
        } else {
            TimestampNsec(raw_ts * 1000)
        }
    }
}

impl PacketMetadata for SimplePacketBlock<'_> {
    #[inline]
    fn caplen(&self) -> u32 {
        min(self.origlen, self.data.len() as u32)
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &self.data[..self.caplen() as usize]
    }

    #[inline]
    fn timestamp(&self) -> TimestampNsec {
        TimestampNsec(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_display() {
        let ts = TimestampNsec(1_700_000_000_123_456_000);
        assert_eq!(ts.to_string(), "2023-11-14 22:13:20.123456 UTC");
        assert_eq!(format!("{:#}", ts), "1700000000.123456000");
    }
}
