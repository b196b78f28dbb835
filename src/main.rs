mod config;
mod error;
mod packet;
mod ping;
mod util;

use std::process;

use colored::*;
use tracing_subscriber::EnvFilter;

use config::Session;
use error::PingError;
use ping::{Pinger, ProbeOutcome};

fn main() {
    let matches = config::app().get_matches();
    init_logging(matches.occurrences_of("verbose"));

    let session = match Session::from_matches(&matches) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            process::exit(2);
        }
    };

    match run(&session) {
        Ok(received) if received > 0 => {}
        Ok(_) => process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            process::exit(2);
        }
    }
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Ping the session target and print each outcome. Returns how many replies came back.
fn run(session: &Session) -> anyhow::Result<usize> {
    let mut pinger = Pinger::open(session.target, session.ttl)?;

    println!("{} {} with {} bytes of data:", "PING".cyan(), session.target.to_string().bold(), session.payload_size);

    let outcomes = pinger.run_sequence(session, print_outcome);
    let received = outcomes.iter().filter(|o| o.is_reply()).count();

    println!();
    println!("{} {} {} {}", "===".yellow(), session.target.to_string().bold(), "ping statistics".cyan(), "===".yellow());
    println!("{} packets transmitted, {} received",
        outcomes.len().to_string().bold(), received.to_string().bold());

    Ok(received)
}

fn print_outcome(outcome: &ProbeOutcome) {
    match &outcome.result {
        Ok(pong) => {
            print!("{} bytes from {}: ", pong.size, pong.address.to_string().yellow());
            print!("icmp_seq={} ", pong.sequence.to_string().bold());
            print!("ttl={} ", pong.ttl.to_string().bold());
            println!("time={}ms", pong.rtt.as_millis().to_string().bold());
        }

        Err(PingError::Timeout(_)) => {
            println!("icmp_seq={} {}", outcome.sequence, "Request timed out".red());
        }

        Err(PingError::TimeExceeded { from }) => {
            println!("From {}: icmp_seq={} Time to live exceeded", from, outcome.sequence);
        }

        Err(PingError::Unreachable { from, code }) => {
            println!("From {}: icmp_seq={} Destination unreachable (code {})", from, outcome.sequence, code);
        }

        Err(e) => {
            eprintln!("icmp_seq={} {}", outcome.sequence, e.to_string().red());
        }
    }
}
