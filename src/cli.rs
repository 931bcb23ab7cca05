use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "rustspray",
    version,
    about = "Runs a script on many SSH servers in parallel",
    next_line_help = true,
    after_help = "Targets may be hostnames, IP addresses or CIDR blocks, each with an optional :port (default 22).\nBy default this is roughly `cat scriptfile | ssh user@target /bin/sh` for every target.\n\nAuth is by private key and/or password. With neither, the none and empty-password\nmethods are still attempted. Host keys are never verified.\n\nExamples:\n  rustspray -p hunter2 10.0.0.0/24\n  rustspray -k id_ed25519 -s recon.sh -T hosts.txt\n  echo hunter2 | rustspray -p - -P 50 -t 2s web01:2222"
)]
pub struct Cli {
    /// Targets: host, host:port, IP, IP:port or CIDR block
    pub targets: Vec<String>,

    /// SSH username
    #[arg(short = 'u', long = "user", default_value = "root")]
    pub user: String,

    /// SSH password, or - to read it from stdin
    #[arg(short = 'p', long = "pass", default_value = "")]
    pub pass: String,

    /// SSH private key file
    #[arg(short = 'k', long = "key")]
    pub key: Option<PathBuf>,

    /// Script file whose contents are fed to the interpreter
    #[arg(short = 's', long = "script", default_value = "spray.script")]
    pub script: PathBuf,

    /// Remote command that receives the script on stdin
    #[arg(short = 'i', long = "interpreter", default_value = "/bin/sh")]
    pub interpreter: String,

    /// Number of targets attacked in parallel
    #[arg(short = 'P', long = "parallel", default_value_t = 200, value_parser = parse_pool_size)]
    pub parallel: usize,

    /// Connection and authentication timeout, each (e.g. 4s, 500ms, 1m30s)
    #[arg(short = 't', long = "timeout", default_value = "4s")]
    pub timeout: String,

    /// Limit on how long the script may run once started (unbounded if unset)
    #[arg(long = "exec-timeout")]
    pub exec_timeout: Option<String>,

    /// File with targets, one per line; blank lines and # comments are skipped
    #[arg(short = 'T', long = "targets")]
    pub targets_file: Option<PathBuf>,

    /// Also try keyboard-interactive auth, answering every prompt with the password
    #[arg(long = "keyboard-interactive")]
    pub keyboard_interactive: bool,

    /// Print one JSON object per result on stdout instead of log lines
    #[arg(long = "json")]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

fn parse_pool_size(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err("at least one worker is needed".to_string()),
        Ok(size) => Ok(size),
        Err(error) => Err(format!("invalid worker count '{raw}': {error}")),
    }
}

/// Parses durations such as `4s`, `250ms`, `1m30s` or `1.5s`. A bare
/// number is taken as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let text = raw.trim();
    if text.is_empty() {
        bail!("Empty duration");
    }

    if let Ok(seconds) = text.parse::<f64>() {
        return nanos_to_duration(seconds * 1e9, raw);
    }

    let mut total = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            bail!("Invalid duration '{raw}'");
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .with_context(|| format!("Invalid duration '{raw}'"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3_600e9,
            _ => bail!("Unknown unit '{unit}' in duration '{raw}'"),
        };

        total += value * scale;
        rest = tail;
    }

    nanos_to_duration(total, raw)
}

fn nanos_to_duration(nanos: f64, raw: &str) -> Result<Duration> {
    if !nanos.is_finite() || nanos < 1.0 || nanos > u64::MAX as f64 {
        bail!("Duration out of range: '{raw}'");
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_in_go_style() {
        assert_eq!(parse_duration("4s").unwrap(), Duration::from_secs(4));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1_500));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn bad_durations_are_rejected() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("4parsecs").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn parallel_is_taken_as_given() {
        let cli = Cli::parse_from(["rustspray", "-P", "3000", "10.0.0.0/20"]);
        assert_eq!(cli.parallel, 3000);

        assert!(Cli::try_parse_from(["rustspray", "-P", "0", "10.0.0.1"]).is_err());
        assert!(Cli::try_parse_from(["rustspray", "-P", "lots", "10.0.0.1"]).is_err());
    }

    #[test]
    fn defaults_match_the_usual_run() {
        let cli = Cli::parse_from(["rustspray", "10.0.0.0/24"]);
        assert_eq!(cli.user, "root");
        assert_eq!(cli.pass, "");
        assert_eq!(cli.interpreter, "/bin/sh");
        assert_eq!(cli.parallel, 200);
        assert_eq!(parse_duration(&cli.timeout).unwrap(), Duration::from_secs(4));
        assert_eq!(cli.targets, vec!["10.0.0.0/24".to_string()]);
        assert!(cli.exec_timeout.is_none());
        assert!(!cli.keyboard_interactive);
    }

    #[test]
    fn flags_and_positionals_mix() {
        let cli = Cli::parse_from([
            "rustspray",
            "-u",
            "admin",
            "-p",
            "-",
            "-P",
            "16",
            "--keyboard-interactive",
            "-T",
            "hosts.txt",
            "web01:2222",
            "db01",
        ]);
        assert_eq!(cli.user, "admin");
        assert_eq!(cli.pass, "-");
        assert_eq!(cli.parallel, 16);
        assert!(cli.keyboard_interactive);
        assert_eq!(cli.targets_file, Some(PathBuf::from("hosts.txt")));
        assert_eq!(cli.targets, vec!["web01:2222".to_string(), "db01".to_string()]);
    }
}
