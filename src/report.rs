use crate::error::{AttackError, TargetError};
use crate::models::{AttackResult, Outcome, PoolSummary, Record};
use std::fmt::{self, Write as _};
use std::io::Write;
use tracing::{info, warn};

/// Maps one attack result onto its outcome.
///
/// No error means success. An error without output means the target was
/// never reached far enough to run anything. An error with output, even
/// empty output, means the script ran and the interpreter reported failure.
pub fn classify(result: &AttackResult) -> Record {
    let outcome = match (&result.error, &result.output) {
        (None, _) => Outcome::Success,
        (Some(_), None) => Outcome::SetupFailure,
        (Some(_), Some(_)) => Outcome::ExecutionFailure,
    };

    let output = match outcome {
        Outcome::SetupFailure => None,
        _ => result
            .output
            .as_deref()
            .filter(|bytes| !bytes.is_empty())
            .map(<[u8]>::to_vec),
    };

    Record {
        endpoint: result.endpoint,
        outcome,
        phase: result.error.as_ref().map(AttackError::phase),
        error: result.error.as_ref().map(ToString::to_string),
        output,
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error = self.error.as_deref().unwrap_or_default();
        match self.outcome {
            Outcome::Success => write!(f, "[{}] SUCCESS", self.endpoint)?,
            Outcome::SetupFailure => return write!(f, "[{}] ERROR: {}", self.endpoint, error),
            Outcome::ExecutionFailure => write!(f, "[{}] FAIL ({})", self.endpoint, error)?,
        }
        if let Some(output) = &self.output {
            write!(f, ": ")?;
            write_quoted(f, output)?;
        }
        Ok(())
    }
}

/// Double-quotes raw output. Printable text stays as it is; control
/// characters and bytes that are not UTF-8 become `\xNN` escapes.
fn write_quoted(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_char('"')?;
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c if c.is_ascii_control() => write!(f, "\\x{:02x}", c as u32)?,
                c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
                c => f.write_char(c)?,
            }
        }
        for byte in chunk.invalid() {
            write!(f, "\\x{byte:02x}")?;
        }
    }
    f.write_char('"')
}

/// Destination for classified records and enumeration failures.
pub trait Report: Send + Sync {
    fn record(&self, record: &Record);
    fn unresolved(&self, target: &str, error: &TargetError);
}

#[derive(Debug, Clone, Copy)]
pub struct LiveReporter {
    json: bool,
}

impl LiveReporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn summary(&self, summary: &PoolSummary) {
        info!("Done.");
        info!(
            "{} endpoint(s): {} succeeded, {} failed, {} error(s), {} target(s) unresolved",
            summary.attacked, summary.succeeded, summary.failed, summary.errored, summary.unresolved
        );
    }
}

impl Report for LiveReporter {
    fn record(&self, record: &Record) {
        if self.json {
            match serde_json::to_string(record) {
                Ok(line) => {
                    let mut stdout = std::io::stdout().lock();
                    let _ = writeln!(stdout, "{line}");
                }
                Err(error) => warn!("[{}] unable to encode record: {error}", record.endpoint),
            }
            return;
        }

        match record.outcome {
            Outcome::Success => info!("{record}"),
            Outcome::SetupFailure | Outcome::ExecutionFailure => warn!("{record}"),
        }
    }

    fn unresolved(&self, target: &str, error: &TargetError) {
        warn!("[{target}] Unable to target: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Phase;
    use crate::models::Endpoint;
    use std::net::{IpAddr, Ipv4Addr};

    fn endpoint() -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)), 22)
    }

    fn result(output: Option<&[u8]>, error: Option<AttackError>) -> AttackResult {
        AttackResult {
            endpoint: endpoint(),
            output: output.map(<[u8]>::to_vec),
            error,
        }
    }

    #[test]
    fn no_error_and_no_output_is_success() {
        let record = classify(&result(None, None));
        assert_eq!(record.outcome, Outcome::Success);
        assert!(record.output.is_none());
        assert_eq!(record.to_string(), "[10.0.0.9:22] SUCCESS");
    }

    #[test]
    fn empty_output_is_suppressed_on_success() {
        let record = classify(&result(Some(b""), None));
        assert_eq!(record.outcome, Outcome::Success);
        assert_eq!(record.to_string(), "[10.0.0.9:22] SUCCESS");
    }

    #[test]
    fn success_output_is_quoted() {
        let record = classify(&result(Some(b"uid=0(root)\n"), None));
        assert_eq!(record.to_string(), r#"[10.0.0.9:22] SUCCESS: "uid=0(root)\n""#);
    }

    #[test]
    fn raw_bytes_are_escaped_without_loss() {
        let record = classify(&result(Some(b"ok\x1b[0m \"q\" caf\xc3\xa9\xff\n"), None));
        assert_eq!(
            record.to_string(),
            r#"[10.0.0.9:22] SUCCESS: "ok\x1b[0m \"q\" café\xff\n""#
        );
        assert_eq!(record.output.as_deref(), Some(&b"ok\x1b[0m \"q\" caf\xc3\xa9\xff\n"[..]));
    }

    #[test]
    fn error_without_output_is_setup_failure() {
        let record = classify(&result(None, Some(AttackError::DialTimeout)));
        assert_eq!(record.outcome, Outcome::SetupFailure);
        assert_eq!(record.phase, Some(Phase::Dial));
        assert!(record.output.is_none());
        assert_eq!(record.to_string(), "[10.0.0.9:22] ERROR: dial timeout");
    }

    #[test]
    fn error_with_output_is_execution_failure() {
        let record = classify(&result(Some(b"hi"), Some(AttackError::ExitStatus(1))));
        assert_eq!(record.outcome, Outcome::ExecutionFailure);
        assert_eq!(
            record.to_string(),
            r#"[10.0.0.9:22] FAIL (process exited with status 1): "hi""#
        );
    }

    #[test]
    fn empty_but_present_output_still_means_it_ran() {
        let record = classify(&result(Some(b""), Some(AttackError::ExitStatus(127))));
        assert_eq!(record.outcome, Outcome::ExecutionFailure);
        assert_eq!(
            record.to_string(),
            "[10.0.0.9:22] FAIL (process exited with status 127)"
        );
    }
}
