use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{App, AppSettings, Arg, ArgMatches};

use crate::error::{PingError, Result};
use crate::packet::{PayloadFill, MAX_PAYLOAD};
use crate::util;

/// Everything one run needs. Built once from the command line and never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub target: Ipv4Addr,
    pub timeout: Duration,
    pub payload_size: usize,
    pub count: u16,

    pub interval: Duration,
    pub ttl: Option<u32>,
    pub fill: PayloadFill,
}

impl Session {
    pub fn new(target: Ipv4Addr) -> Self {
        Session {
            target,
            timeout: Duration::from_millis(1000),
            payload_size: 32,
            count: 4,
            interval: Duration::from_secs(1),
            ttl: None,
            fill: PayloadFill::Zeros,
        }
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let target = util::parse_target(matches.value_of("DESTINATION").unwrap_or_default())?;

        let timeout = parse_number::<u64>(matches, "timeout")?;
        if timeout == 0 {
            return Err(PingError::Config("timeout must be at least 1ms".into()));
        }

        let payload_size = parse_number::<usize>(matches, "size")?;
        if payload_size > MAX_PAYLOAD {
            return Err(PingError::Config(format!("payload size must not exceed {} bytes", MAX_PAYLOAD)));
        }

        let count = parse_number::<u16>(matches, "count")?;
        if count == 0 {
            return Err(PingError::Config("count must be at least 1".into()));
        }

        let interval = matches.value_of("interval").unwrap_or("1s");
        let interval = humantime::parse_duration(interval)
            .map_err(|e| PingError::Config(format!("invalid interval {} (ex: 1s, 400ms): {}", interval, e)))?;

        let ttl = match matches.value_of("ttl") {
            Some(ttl) => match ttl.parse::<u32>() {
                Ok(t @ 1..=255) => Some(t),
                _ => return Err(PingError::Config(format!("invalid ttl {} (ex: 64)", ttl))),
            },
            None => None,
        };

        let fill = if matches.is_present("random") { PayloadFill::Random } else { PayloadFill::Zeros };

        Ok(Session {
            target,
            timeout: Duration::from_millis(timeout),
            payload_size,
            count,
            interval,
            ttl,
            fill,
        })
    }
}

fn parse_number<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    let value = matches.value_of(name).unwrap_or_default();
    value.parse::<T>().map_err(|_| PingError::Config(format!("invalid value {:?} for {}", value, name)))
}

pub fn app() -> App<'static, 'static> {
    App::new("echoring")
        .setting(AppSettings::ColoredHelp)
        .version("v1.0")
        .author("Bryan Becar <becar.bryan@gmail.com>")
        .about("Send ICMP echo requests to an IPv4 address and report each reply.")
        .arg(Arg::with_name("DESTINATION")
            .help("IPv4 address")
            .required(true)
            .index(1))
        .arg(Arg::with_name("timeout")
            .help("How long to wait for each reply, in milliseconds")
            .short("w")
            .takes_value(true)
            .default_value("1000"))
        .arg(Arg::with_name("size")
            .help("Number of payload bytes to send")
            .short("l")
            .takes_value(true)
            .default_value("32"))
        .arg(Arg::with_name("count")
            .help("Number of echo requests to send")
            .short("n")
            .takes_value(true)
            .default_value("4"))
        .arg(Arg::with_name("interval")
            .help("Set how long to wait in between pings (Default 1s)")
            .short("i")
            .takes_value(true))
        .arg(Arg::with_name("ttl")
            .help("Set ttl on outgoing packets")
            .short("t")
            .takes_value(true))
        .arg(Arg::with_name("random")
            .help("Fill the payload with random bytes instead of zeros")
            .short("r"))
        .arg(Arg::with_name("verbose")
            .help("Log more (repeat for more detail)")
            .short("v")
            .multiple(true))
}
