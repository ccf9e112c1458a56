use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

use gtpu_tunnel::TunnelError;

/// Per-thread replay counters, flushed into [`Stats`] every
/// [`FLUSH_INTERVAL`] packets.
#[derive(Default, Debug, Clone)]
pub struct LocalStats {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub output_bytes: u64,

    pub transformed: u64,

    // not a tunnel candidate, left as is
    pub not_tunnel: u64,
    pub arp: u64,
    pub no_context: u64,

    // rejected
    pub too_short: u64,
    pub headroom: u64,
    pub unsupported: u64,
    pub malformed: u64,
    pub other_errors: u64,
}

impl LocalStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the outcome of one transform.
    #[inline]
    pub fn record(&mut self, result: &Result<(), TunnelError>) {
        match result {
            Ok(()) => self.transformed += 1,
            Err(TunnelError::NotTunnel) => self.not_tunnel += 1,
            Err(TunnelError::Arp) => self.arp += 1,
            Err(TunnelError::MissingContext) => self.no_context += 1,
            Err(TunnelError::TooShort { .. }) => self.too_short += 1,
            Err(TunnelError::InsufficientHeadroom { .. }) | Err(TunnelError::Buffer(_)) => {
                self.headroom += 1
            }
            Err(TunnelError::UnsupportedL3(_)) | Err(TunnelError::UnsupportedL4(_)) => {
                self.unsupported += 1
            }
            Err(TunnelError::Malformed(_)) => self.malformed += 1,
            Err(_) => self.other_errors += 1,
        }
    }

    /// Adds the local counters to `stats` and resets them.
    #[inline]
    pub fn flush(&mut self, stats: &Stats) {
        macro_rules! flush_counter {
            ($($field:ident),+ $(,)?) => {
                $(
                    if self.$field > 0 {
                        stats.$field.fetch_add(self.$field, Ordering::Relaxed);
                        self.$field = 0;
                    }
                )+
            };
        }

        flush_counter!(
            total_packets,
            total_bytes,
            output_bytes,
            transformed,
            not_tunnel,
            arp,
            no_context,
            too_short,
            headroom,
            unsupported,
            malformed,
            other_errors,
        );
    }

    /// True every `interval` packets; `interval` must be a power of two.
    #[inline]
    pub fn should_flush(&self, interval: u64) -> bool {
        self.total_packets & (interval - 1) == 0
    }
}

/// Flush interval for local stats (must be power of 2)
pub const FLUSH_INTERVAL: u64 = 1024;

#[derive(Default, Debug)]
pub struct Stats {
    pub total_packets: AtomicU64,
    pub total_bytes: AtomicU64,
    pub output_bytes: AtomicU64,

    pub transformed: AtomicU64,

    pub not_tunnel: AtomicU64,
    pub arp: AtomicU64,
    pub no_context: AtomicU64,

    pub too_short: AtomicU64,
    pub headroom: AtomicU64,
    pub unsupported: AtomicU64,
    pub malformed: AtomicU64,
    pub other_errors: AtomicU64,
}

impl Stats {
    #[inline]
    fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn total_passed(&self) -> u64 {
        self.get(&self.not_tunnel) + self.get(&self.arp) + self.get(&self.no_context)
    }

    pub fn total_errors(&self) -> u64 {
        self.get(&self.too_short)
            + self.get(&self.headroom)
            + self.get(&self.unsupported)
            + self.get(&self.malformed)
            + self.get(&self.other_errors)
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Tunnel Statistics ===")?;
        writeln!(f)?;

        writeln!(f, "--- General ---")?;
        writeln!(f, "Total packets processed: {}", self.get(&self.total_packets))?;
        writeln!(f, "Total bytes in: {}", self.get(&self.total_bytes))?;
        writeln!(f, "Total bytes out: {}", self.get(&self.output_bytes))?;
        writeln!(f, "Transformed: {}", self.get(&self.transformed))?;
        writeln!(f)?;

        writeln!(f, "--- Passed through ---")?;
        writeln!(f, "Total passed: {}", self.total_passed())?;
        writeln!(f, "  Not GTP-U: {}", self.get(&self.not_tunnel))?;
        writeln!(f, "  ARP: {}", self.get(&self.arp))?;
        writeln!(f, "  No tunnel context: {}", self.get(&self.no_context))?;
        writeln!(f)?;

        let total_errors = self.total_errors();
        if total_errors > 0 {
            writeln!(f, "--- Errors ---")?;
            writeln!(f, "Total errors: {}", total_errors)?;
            writeln!(f, "  Too short: {}", self.get(&self.too_short))?;
            writeln!(f, "  Insufficient headroom: {}", self.get(&self.headroom))?;
            writeln!(f, "  Unsupported protocol: {}", self.get(&self.unsupported))?;
            writeln!(f, "  Malformed: {}", self.get(&self.malformed))?;
            writeln!(f, "  Other errors: {}", self.get(&self.other_errors))?;
        }

        Ok(())
    }
}
