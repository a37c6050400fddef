use std::{process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use framecast::{FrameError, Message, SendError, SendOptions};

const EXIT_ARGUMENT: u8 = 1;
const EXIT_OUT_OF_RANGE: u8 = 2;
const EXIT_CONNECTION: u8 = 3;
const EXIT_TRANSMISSION: u8 = 4;

/// Send one addressed message over a TCP connection
#[derive(Parser, Debug)]
#[command(
    version,
    after_help = "Exit status:\n  \
        0  message written\n  \
        1  missing or malformed arguments\n  \
        2  address or payload does not fit in 16 bits\n  \
        3  could not connect\n  \
        4  write failed"
)]
struct Args {
    /// Message address (16-bit)
    #[arg(allow_negative_numbers = true, value_parser = parse_address)]
    address: i64,

    /// Message data (UTF-8 string)
    #[arg(allow_negative_numbers = true)]
    data: String,

    /// Destination host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Destination port
    #[arg(long, default_value_t = 8000, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Seconds to keep the connection open after writing
    #[arg(long, default_value_t = 3)]
    linger: u64,
}

/// Accept any integer, clamping to the i64 range so that huge values are still
/// reported as out of range by the encoder rather than as malformed input
fn parse_address(s: &str) -> Result<i64, String> {
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{}' is not an integer", s));
    }

    Ok(match s.parse::<i64>() {
        Ok(n) => n,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    })
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version end up here too
            return if e.use_stderr() {
                ExitCode::from(EXIT_ARGUMENT)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    framecast::init_logging("warn");

    match run(&args) {
        Ok(()) => {
            println!("Message sent successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let msg = Message::new(args.address, &args.data).context("Cannot encode message")?;
    let frame = msg.encode();
    debug!(address = msg.address(), bytes = frame.len(), "encoded");

    let opts = SendOptions {
        linger: Duration::from_secs(args.linger),
    };
    framecast::send(&args.host, args.port, &frame, &opts)?;

    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<FrameError>().is_some() {
            return EXIT_OUT_OF_RANGE;
        }
        match cause.downcast_ref::<SendError>() {
            Some(SendError::Connection { .. }) => return EXIT_CONNECTION,
            Some(SendError::Transmission { .. }) => return EXIT_TRANSMISSION,
            None => (),
        }
    }
    EXIT_ARGUMENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["framecast", "42", "hello"]).unwrap();
        assert_eq!(args.address, 42);
        assert_eq!(args.data, "hello");
        assert_eq!(args.host, "localhost");
        assert_eq!(args.port, 8000);
        assert_eq!(args.linger, 3);
    }

    #[test]
    fn negative_address_reaches_encoder() {
        let args = Args::try_parse_from(["framecast", "-1", "x"]).unwrap();
        assert_eq!(args.address, -1);

        let err = run(&args).unwrap_err();
        assert_eq!(exit_code(&err), EXIT_OUT_OF_RANGE);
    }

    #[test]
    fn huge_addresses_saturate() {
        assert_eq!(parse_address("99999999999999999999"), Ok(i64::MAX));
        assert_eq!(parse_address("-99999999999999999999"), Ok(i64::MIN));
        assert_eq!(parse_address("+17"), Ok(17));
        assert!(parse_address("").is_err());
        assert!(parse_address("-").is_err());
        assert!(parse_address("12a").is_err());
        assert!(parse_address("0x10").is_err());

        let args = Args::try_parse_from(["framecast", "99999999999999999999", "x"]).unwrap();
        let err = run(&args).unwrap_err();
        assert_eq!(exit_code(&err), EXIT_OUT_OF_RANGE);
    }

    #[test]
    fn payload_may_look_like_a_number() {
        let args = Args::try_parse_from(["framecast", "1", "-5"]).unwrap();
        assert_eq!(args.data, "-5");
    }

    #[test]
    fn malformed_arguments() {
        assert!(Args::try_parse_from(["framecast", "abc", "x"]).is_err());
        assert!(Args::try_parse_from(["framecast", "1"]).is_err());
        assert!(Args::try_parse_from(["framecast", "1", "x", "--port", "0"]).is_err());
        assert!(Args::try_parse_from(["framecast", "1", "x", "--port", "70000"]).is_err());
    }

    #[test]
    fn error_kinds_map_to_exit_codes() {
        let range = anyhow::Error::new(FrameError::OutOfRange(70000)).context("Cannot encode");
        assert_eq!(exit_code(&range), EXIT_OUT_OF_RANGE);

        let refused = anyhow::Error::new(SendError::Connection {
            host: "localhost".into(),
            port: 1,
            source: std::io::ErrorKind::ConnectionRefused.into(),
        });
        assert_eq!(exit_code(&refused), EXIT_CONNECTION);

        let broken = anyhow::Error::new(SendError::Transmission {
            peer: "127.0.0.1:1".into(),
            len: 4,
            source: std::io::ErrorKind::BrokenPipe.into(),
        });
        assert_eq!(exit_code(&broken), EXIT_TRANSMISSION);
    }
}
