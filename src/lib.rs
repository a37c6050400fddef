//! Send a single addressed frame over TCP, and decode such frames on the other end.

pub mod frame;
pub mod receiver;
pub mod sender;

pub use frame::{encode, FrameError, Message, HEADER_SIZE, MAX_PAYLOAD_LEN};
pub use receiver::{FrameReceiver, ReadState, ReceiverFilter};
pub use sender::{send, SendError, SendOptions, DEFAULT_LINGER};

/// Install a stderr `tracing` subscriber, honouring `RUST_LOG` when it is set
pub fn init_logging(default_filter: &str) {
    use std::io::IsTerminal;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A subscriber may already be installed (e.g. by a test harness); that's fine
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();
}
