use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while pinging.
///
/// `Connect`, `InvalidTarget` and `Config` end the run; the rest only fail the probe
/// they happened on.
#[derive(Error, Debug)]
pub enum PingError {
    #[error("cannot open raw ICMP socket: {0}")]
    Connect(io::Error),

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("truncated packet: got {len} bytes, need at least {needed}")]
    TruncatedPacket { len: usize, needed: usize },

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("destination unreachable (code {code}) from {from}")]
    Unreachable { from: Ipv4Addr, code: u8 },

    #[error("time to live exceeded from {from}")]
    TimeExceeded { from: Ipv4Addr },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid option: {0}")]
    Config(String),
}

impl From<bincode::Error> for PingError {
    fn from(e: bincode::Error) -> Self {
        PingError::Malformed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_error_is_reported_once() {
        let e = PingError::Connect(io::Error::from_raw_os_error(1));
        let os = io::Error::from_raw_os_error(1).to_string();

        let shown = format!("{:#}", anyhow::Error::from(e));
        assert_eq!(shown.matches(os.as_str()).count(), 1, "{}", shown);
        assert!(shown.starts_with("cannot open raw ICMP socket: "));

        let shown = PingError::Io(io::Error::new(io::ErrorKind::Other, "sendto refused")).to_string();
        assert_eq!(shown, "I/O error: sendto refused");
    }
}
