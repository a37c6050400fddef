use std::{
    io::{self, Write},
    net::TcpStream,
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, info};

/// How long the connection stays open after the write completes by default
pub const DEFAULT_LINGER: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum SendError {
    #[error("could not connect to {host}:{port}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {len} bytes to {peer}")]
    Transmission {
        peer: String,
        len: usize,
        #[source]
        source: io::Error,
    },
}

#[derive(Copy, Clone, Debug)]
pub struct SendOptions {
    /// Time the connection is held open after the frame is written, so the peer
    /// gets a chance to read it before we close. There is no acknowledgement,
    /// so this does not guarantee delivery.
    pub linger: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            linger: DEFAULT_LINGER,
        }
    }
}

/// Open one connection to `host:port`, write `frame` in full, linger, then close
pub fn send(host: &str, port: u16, frame: &[u8], opts: &SendOptions) -> Result<(), SendError> {
    let mut stream = TcpStream::connect((host, port)).map_err(|source| SendError::Connection {
        host: host.to_owned(),
        port,
        source,
    })?;

    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| format!("{}:{}", host, port));
    debug!(%peer, "connected");

    // The stream is dropped (and closed) on every path out of here
    deliver(&mut stream, frame, &peer, opts.linger)
}

/// Write the whole frame, then hold the writer for `linger`
pub(crate) fn deliver<W: Write>(
    writer: &mut W,
    frame: &[u8],
    peer: &str,
    linger: Duration,
) -> Result<(), SendError> {
    writer
        .write_all(frame)
        .and_then(|_| writer.flush())
        .map_err(|source| SendError::Transmission {
            peer: peer.to_owned(),
            len: frame.len(),
            source,
        })?;
    info!(peer, bytes = frame.len(), "frame written");

    if !linger.is_zero() {
        debug!(?linger, "holding connection open");
        std::thread::sleep(linger);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Accepts a few bytes, then fails
    struct BrokenPipe {
        accepted: usize,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accepted >= 2 {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            let n = buf.len().min(2 - self.accepted);
            self.accepted += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_write_is_an_error() {
        let mut w = BrokenPipe { accepted: 0 };
        let err = deliver(&mut w, b"\x00\x01\x00\x02hi", "test", Duration::ZERO).unwrap_err();

        match err {
            SendError::Transmission { len, source, .. } => {
                assert_eq!(len, 6);
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn deliver_writes_everything_and_lingers() {
        let mut out = Vec::new();
        let start = Instant::now();
        deliver(&mut out, b"\x00\x2a\x00\x00", "test", Duration::from_millis(50)).unwrap();

        assert_eq!(out, b"\x00\x2a\x00\x00");
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn default_linger_is_three_seconds() {
        assert_eq!(SendOptions::default().linger, Duration::from_secs(3));
    }
}
