use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use framecast::{FrameReceiver, ReadState, ReceiverFilter, MAX_PAYLOAD_LEN};

/// Accept connections and log every frame received. Never replies.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Only accept frames sent to this address
    #[arg(long)]
    address: Option<u16>,

    /// Skip frames declaring a longer payload than this
    #[arg(long, default_value_t = MAX_PAYLOAD_LEN)]
    max_payload: usize,

    /// Exit after the first connection closes
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    framecast::init_logging("info");

    let filter = ReceiverFilter {
        local_address: args.address,
        max_payload: args.max_payload,
    };

    let listener =
        TcpListener::bind(args.bind).with_context(|| format!("Failed to bind {}", args.bind))?;
    info!(addr = %listener.local_addr()?, "listening");

    serve(listener.incoming(), filter, args.once);
    Ok(())
}

/// Handle connections one after another. Returns the number handled once the first
/// connection closes if `once` is set, or when `incoming` runs out.
fn serve<I>(incoming: I, filter: ReceiverFilter, once: bool) -> usize
where
    I: IntoIterator<Item = io::Result<TcpStream>>,
{
    let mut handled = 0;

    for conn in incoming {
        let stream = match conn {
            Ok(stream) => stream,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        handled += 1;

        // One misbehaving peer shouldn't take the listener down
        if let Err(e) = handle_connection(stream, filter) {
            warn!("connection error: {:#}", e);
        }

        if once {
            break;
        }
    }

    handled
}

fn handle_connection(mut stream: TcpStream, filter: ReceiverFilter) -> Result<()> {
    let addr = stream.peer_addr()?;
    info!(%addr, "connected");
    let mut receiver = FrameReceiver::with_filter(filter);

    loop {
        match receiver.read(&mut stream)? {
            ReadState::Incomplete => (),
            ReadState::Complete(msg) => {
                info!(
                    %addr,
                    address = msg.address(),
                    length = msg.payload().len(),
                    "frame: {}",
                    String::from_utf8_lossy(msg.payload())
                );
            }
            ReadState::Ignored(address) => {
                info!(%addr, address, "frame for another address ignored");
            }
            ReadState::Invalid { address, length } => {
                warn!(%addr, address, length, "payload too long, skipping frame");
            }
            ReadState::Disconnected => {
                if !receiver.is_idle() {
                    warn!(%addr, "disconnected mid-frame");
                }
                info!(%addr, "disconnected");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// A server-side stream whose peer already sent `bytes` and hung up
    fn finished_connection(bytes: &[u8]) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client.write_all(bytes).unwrap();
        drop(client);

        listener.accept().unwrap().0
    }

    #[test]
    fn accept_errors_are_skipped() {
        let incoming: Vec<io::Result<TcpStream>> = vec![
            Err(io::ErrorKind::ConnectionAborted.into()),
            Ok(finished_connection(&framecast::encode(1, "hi").unwrap())),
            Err(io::ErrorKind::ConnectionReset.into()),
            Ok(finished_connection(&[])),
        ];

        assert_eq!(serve(incoming, ReceiverFilter::default(), false), 2);
    }

    #[test]
    fn once_stops_after_first_connection() {
        let incoming: Vec<io::Result<TcpStream>> = vec![
            Err(io::ErrorKind::ConnectionAborted.into()),
            Ok(finished_connection(&framecast::encode(1, "hi").unwrap())),
            Ok(finished_connection(&[])),
        ];

        assert_eq!(serve(incoming, ReceiverFilter::default(), true), 1);
    }
}
