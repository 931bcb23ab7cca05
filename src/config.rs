use crate::error::PreflightError;
use crate::models::{AuthMethod, SprayConfig};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct Credentials<'a> {
    pub user: &'a str,
    pub key: Option<&'a Path>,
    pub pass: &'a str,
    pub keyboard_interactive: bool,
}

pub fn load_script(path: &Path) -> Result<Vec<u8>, PreflightError> {
    if path.as_os_str().is_empty() {
        return Err(PreflightError::MissingScript);
    }

    fs::read(path).map_err(|source| PreflightError::ScriptRead {
        path: path.to_path_buf(),
        source,
    })
}

fn load_key(path: &Path) -> Result<AuthMethod, PreflightError> {
    let pem = fs::read_to_string(path).map_err(|source| PreflightError::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;

    let key = russh_keys::decode_secret_key(&pem, None).map_err(|source| {
        PreflightError::KeyParse {
            path: path.to_path_buf(),
            source,
        }
    })?;

    Ok(AuthMethod::PublicKey(Arc::new(key)))
}

/// Reads a single line, dropping `\r`. EOF ends the password too, so
/// `printf pass | rustspray -p -` works.
pub fn read_password<R: Read>(mut reader: R) -> io::Result<String> {
    let mut password = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => match byte[0] {
                b'\n' => break,
                b'\r' => {}
                other => password.push(other),
            },
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }

    String::from_utf8(password).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
}

/// Builds the auth method list in attempt order: key, password,
/// then keyboard-interactive when enabled.
pub fn build_auth(credentials: &Credentials<'_>) -> Result<Vec<AuthMethod>, PreflightError> {
    let mut auth = Vec::with_capacity(3);

    if let Some(path) = credentials.key {
        auth.push(load_key(path)?);
    }

    let password = if credentials.pass == "-" {
        read_password(io::stdin().lock()).map_err(PreflightError::PasswordRead)?
    } else {
        credentials.pass.to_string()
    };

    auth.push(AuthMethod::Password(password.clone()));
    if credentials.keyboard_interactive {
        auth.push(AuthMethod::KeyboardInteractive(password));
    }

    Ok(auth)
}

pub fn build_config(
    credentials: &Credentials<'_>,
    interpreter: &str,
    script: Vec<u8>,
    timeout: Duration,
    exec_timeout: Option<Duration>,
) -> Result<SprayConfig, PreflightError> {
    if credentials.user.is_empty() {
        return Err(PreflightError::MissingUser);
    }

    Ok(SprayConfig {
        user: credentials.user.to_string(),
        auth: build_auth(credentials)?,
        interpreter: interpreter.to_string(),
        script,
        timeout,
        exec_timeout,
    })
}

/// Non-blank, non-comment lines of a targets file, trimmed.
pub fn parse_target_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_targets_file(path: &Path) -> io::Result<Vec<String>> {
    Ok(parse_target_lines(&fs::read_to_string(path)?))
}

/// Positional targets followed by those from the targets file. A file that
/// cannot be read is logged and skipped; an empty result is fatal.
pub fn gather_targets(
    positional: &[String],
    file: Option<&Path>,
) -> Result<Vec<String>, PreflightError> {
    let mut targets = positional.to_vec();
    if let Some(path) = file {
        match load_targets_file(path) {
            Ok(lines) => targets.extend(lines),
            Err(error) => warn!("Error reading targets from {}: {error}", path.display()),
        }
    }

    if targets.is_empty() {
        return Err(PreflightError::NoTargets);
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn credentials(pass: &str, keyboard_interactive: bool) -> Credentials<'_> {
        Credentials {
            user: "root",
            key: None,
            pass,
            keyboard_interactive,
        }
    }

    #[test]
    fn password_stops_at_newline_and_drops_cr() {
        let password = read_password(Cursor::new(b"hunter2\r\nignored\n".to_vec())).unwrap();
        assert_eq!(password, "hunter2");
    }

    #[test]
    fn password_stops_at_eof() {
        let password = read_password(Cursor::new(b"no-newline".to_vec())).unwrap();
        assert_eq!(password, "no-newline");

        let password = read_password(Cursor::new(Vec::new())).unwrap();
        assert_eq!(password, "");
    }

    #[test]
    fn auth_order_is_password_then_keyboard_interactive() {
        let auth = build_auth(&credentials("secret", true)).unwrap();
        let names: Vec<&str> = auth.iter().map(AuthMethod::name).collect();
        assert_eq!(names, vec!["password", "keyboard-interactive"]);

        let auth = build_auth(&credentials("", false)).unwrap();
        assert!(matches!(auth.as_slice(), [AuthMethod::Password(p)] if p.is_empty()));
    }

    #[test]
    fn missing_user_is_fatal() {
        let creds = Credentials {
            user: "",
            key: None,
            pass: "",
            keyboard_interactive: false,
        };
        let error = build_config(&creds, "/bin/sh", Vec::new(), Duration::from_secs(4), None)
            .unwrap_err();
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn unreadable_key_is_fatal() {
        let creds = Credentials {
            user: "root",
            key: Some(Path::new("/nonexistent/id_ed25519")),
            pass: "",
            keyboard_interactive: false,
        };
        let error = build_auth(&creds).unwrap_err();
        assert!(matches!(error, PreflightError::KeyRead { .. }));
    }

    #[test]
    fn garbage_key_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not a private key").unwrap();

        let creds = Credentials {
            user: "root",
            key: Some(file.path()),
            pass: "",
            keyboard_interactive: false,
        };
        let error = build_auth(&creds).unwrap_err();
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn script_is_loaded_verbatim() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"#!/bin/sh\nid\x00\xff").unwrap();

        let script = load_script(file.path()).unwrap();
        assert_eq!(script, b"#!/bin/sh\nid\x00\xff");
    }

    #[test]
    fn script_errors_are_distinct() {
        let error = load_script(Path::new("")).unwrap_err();
        assert_eq!(error.exit_code(), 1);

        let error = load_script(Path::new("/nonexistent/spray.script")).unwrap_err();
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn target_file_skips_blanks_and_comments() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "# lab hosts\n10.0.0.0/30\n\n   \n  web01:2222  \n#db01\nbastion\n"
        )
        .unwrap();

        let targets = load_targets_file(file.path()).unwrap();
        assert_eq!(targets, vec!["10.0.0.0/30", "web01:2222", "bastion"]);
    }

    #[test]
    fn positional_targets_come_before_file_targets() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "db01\n").unwrap();

        let targets = gather_targets(&["web01".to_string()], Some(file.path())).unwrap();
        assert_eq!(targets, vec!["web01", "db01"]);
    }

    #[test]
    fn empty_or_unreadable_target_file_alone_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "# nothing here yet\n\n").unwrap();
        let error = gather_targets(&[], Some(file.path())).unwrap_err();
        assert!(matches!(error, PreflightError::NoTargets));

        let missing = Path::new("/nonexistent/hosts.txt");
        let error = gather_targets(&[], Some(missing)).unwrap_err();
        assert_eq!(error.exit_code(), 6);

        let targets = gather_targets(&["10.0.0.1".to_string()], Some(missing)).unwrap();
        assert_eq!(targets, vec!["10.0.0.1"]);
    }
}
