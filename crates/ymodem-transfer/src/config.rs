//! Engine timing and retry configuration.

use std::time::Duration;

use crate::protocol::*;

/// Deadlines and retry bounds for one engine.
#[derive(Debug, Clone)]
pub struct ModemConfig {
    /// Overall bound on waiting for the peer to start a transfer.
    pub handshake_timeout: Duration,
    /// Receiver: interval between start probes.
    pub probe_interval: Duration,
    /// Receiver: CRC probes sent before falling back to checksum probes.
    pub crc_probes: u32,
    /// Receiver: wait for each block's control byte, and the longest
    /// silence allowed between two bytes of its body.
    pub block_timeout: Duration,
    /// Sender: wait for the response to each block.
    pub ack_timeout: Duration,
    /// Consecutive errors on one block that abort the transfer.
    pub max_errors: u32,
    /// Slice length of blocking reads; bounds cancellation latency.
    pub poll_interval: Duration,
    /// Quiet time that ends a line purge after a receive error.
    pub purge_quiet: Duration,
    /// CAN bytes written when abandoning a session.
    pub cancel_burst: usize,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            handshake_timeout: Duration::from_millis(WAIT_FOR_RECEIVER_TIMEOUT_MS),
            probe_interval: Duration::from_millis(REQUEST_TIMEOUT_MS),
            crc_probes: CRC_PROBES,
            block_timeout: Duration::from_millis(BLOCK_TIMEOUT_MS),
            ack_timeout: Duration::from_millis(SEND_BLOCK_TIMEOUT_MS),
            max_errors: MAX_ERRORS,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            purge_quiet: Duration::from_millis(PURGE_QUIET_MS),
            cancel_burst: CANCEL_BURST,
        }
    }
}

impl ModemConfig {
    /// Defaults overridden by `YMODEM_*` environment variables. Unset,
    /// unparsable or zero durations and counts keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let count = |key: &str, default: u32| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        ModemConfig {
            handshake_timeout: millis("YMODEM_HANDSHAKE_TIMEOUT_MS", defaults.handshake_timeout),
            probe_interval: millis("YMODEM_PROBE_INTERVAL_MS", defaults.probe_interval),
            crc_probes: lookup("YMODEM_CRC_PROBES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.crc_probes),
            block_timeout: millis("YMODEM_BLOCK_TIMEOUT_MS", defaults.block_timeout),
            ack_timeout: millis("YMODEM_ACK_TIMEOUT_MS", defaults.ack_timeout),
            max_errors: count("YMODEM_MAX_ERRORS", defaults.max_errors),
            poll_interval: millis("YMODEM_POLL_INTERVAL_MS", defaults.poll_interval),
            purge_quiet: millis("YMODEM_PURGE_QUIET_MS", defaults.purge_quiet),
            cancel_burst: defaults.cancel_burst,
        }
    }
}
