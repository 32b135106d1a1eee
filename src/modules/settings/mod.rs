//! Process-wide configuration loaded from a properties source.
//!
//! Keys live in the `mailforge.*` namespace; every key can also be supplied
//! through the environment by uppercasing it and replacing dots with
//! underscores (`mailforge.smtp.host` becomes `MAILFORGE_SMTP_HOST`).
//! Environment values take precedence over file values, and everything here
//! sits at the bottom of the per-mailer resolution chain.

use std::io::BufRead;
use std::path::Path;
use std::sync::{LazyLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::transport::strategy::TransportStrategy;
use crate::raise_error;

pub const KEY_DEBUG: &str = "mailforge.debug";
pub const KEY_TRANSPORT_STRATEGY: &str = "mailforge.transportstrategy";
pub const KEY_SMTP_HOST: &str = "mailforge.smtp.host";
pub const KEY_SMTP_PORT: &str = "mailforge.smtp.port";
pub const KEY_SMTP_USERNAME: &str = "mailforge.smtp.username";
pub const KEY_SMTP_PASSWORD: &str = "mailforge.smtp.password";
pub const KEY_PROXY_HOST: &str = "mailforge.proxy.host";
pub const KEY_PROXY_PORT: &str = "mailforge.proxy.port";
pub const KEY_PROXY_USERNAME: &str = "mailforge.proxy.username";
pub const KEY_PROXY_PASSWORD: &str = "mailforge.proxy.password";
pub const KEY_PROXY_BRIDGE_PORT: &str = "mailforge.proxy.socksbridge.port";
pub const KEY_OPPORTUNISTIC_TLS: &str = "mailforge.opportunistic.tls";

const ALL_KEYS: &[&str] = &[
    KEY_DEBUG,
    KEY_TRANSPORT_STRATEGY,
    KEY_SMTP_HOST,
    KEY_SMTP_PORT,
    KEY_SMTP_USERNAME,
    KEY_SMTP_PASSWORD,
    KEY_PROXY_HOST,
    KEY_PROXY_PORT,
    KEY_PROXY_USERNAME,
    KEY_PROXY_PASSWORD,
    KEY_PROXY_BRIDGE_PORT,
    KEY_OPPORTUNISTIC_TLS,
];

static CONFIG: LazyLock<RwLock<ConfigSnapshot>> =
    LazyLock::new(|| RwLock::new(ConfigSnapshot::default()));

/// The recognized configuration values, all optional. Unset fields defer to
/// higher-precedence sources or to built-in defaults.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub debug: Option<bool>,
    pub transport_strategy: Option<TransportStrategy>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub proxy_bridge_port: Option<u16>,
    pub opportunistic_tls: Option<bool>,
}

impl ConfigSnapshot {
    fn apply(&mut self, key: &str, value: &str) -> MailForgeResult<()> {
        match key {
            KEY_DEBUG => self.debug = Some(parse_bool(key, value)?),
            KEY_TRANSPORT_STRATEGY => self.transport_strategy = Some(value.parse()?),
            KEY_SMTP_HOST => self.smtp_host = Some(value.to_string()),
            KEY_SMTP_PORT => self.smtp_port = Some(parse_port(key, value)?),
            KEY_SMTP_USERNAME => self.smtp_username = Some(value.to_string()),
            KEY_SMTP_PASSWORD => self.smtp_password = Some(value.to_string()),
            KEY_PROXY_HOST => self.proxy_host = Some(value.to_string()),
            KEY_PROXY_PORT => self.proxy_port = Some(parse_port(key, value)?),
            KEY_PROXY_USERNAME => self.proxy_username = Some(value.to_string()),
            KEY_PROXY_PASSWORD => self.proxy_password = Some(value.to_string()),
            KEY_PROXY_BRIDGE_PORT => self.proxy_bridge_port = Some(parse_port(key, value)?),
            KEY_OPPORTUNISTIC_TLS => self.opportunistic_tls = Some(parse_bool(key, value)?),
            _ => {
                debug!(key, "ignoring unrecognized configuration key");
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> MailForgeResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(raise_error!(
            format!("Invalid boolean for {}: {}", key, other),
            ErrorCode::InvalidParameter
        )),
    }
}

fn parse_port(key: &str, value: &str) -> MailForgeResult<u16> {
    value.trim().parse().map_err(|_| {
        raise_error!(
            format!("Invalid port number for {}: {}", key, value),
            ErrorCode::InvalidParameter
        )
    })
}

fn env_name(key: &str) -> String {
    key.to_ascii_uppercase().replace('.', "_")
}

fn parse_properties(reader: impl BufRead) -> MailForgeResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for line in reader.lines() {
        let line =
            line.map_err(|e| raise_error!(e.to_string(), ErrorCode::MissingConfiguration))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(raise_error!(
                format!("Malformed properties line: {}", line),
                ErrorCode::MissingConfiguration
            ));
        };
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(pairs)
}

/// Loads configuration from a properties reader. With `replace` the current
/// snapshot is discarded first; otherwise the new values are merged over
/// it. Environment overrides are applied last either way.
pub fn load_config(reader: impl BufRead, replace: bool) -> MailForgeResult<()> {
    let pairs = parse_properties(reader)?;

    let mut snapshot = if replace {
        ConfigSnapshot::default()
    } else {
        snapshot()
    };
    for (key, value) in &pairs {
        snapshot.apply(key, value)?;
    }
    for key in ALL_KEYS {
        if let Ok(value) = std::env::var(env_name(key)) {
            snapshot.apply(key, &value)?;
        }
    }

    *CONFIG.write().expect("config lock poisoned") = snapshot;
    debug!(entries = pairs.len(), replace, "configuration loaded");
    Ok(())
}

/// Loads configuration from a properties file on disk, replacing the
/// current snapshot.
pub fn load_config_file(path: impl AsRef<Path>) -> MailForgeResult<()> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| {
        raise_error!(
            format!("Cannot open config file {}: {}", path.display(), e),
            ErrorCode::MissingConfiguration
        )
    })?;
    load_config(std::io::BufReader::new(file), true)
}

/// Resets the process-wide configuration to empty.
pub fn clear_config() {
    *CONFIG.write().expect("config lock poisoned") = ConfigSnapshot::default();
}

/// The current configuration by value. Mailer builders capture this once at
/// construction, so later loads never mutate an in-flight builder.
pub fn snapshot() -> ConfigSnapshot {
    CONFIG.read().expect("config lock poisoned").clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    // The config is a process-global, so these tests serialize on a lock to
    // avoid trampling each other.
    static TEST_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn locked() -> std::sync::MutexGuard<'static, ()> {
        let guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        clear_config();
        guard
    }

    #[test]
    fn load_parses_the_recognized_keys() {
        let _guard = locked();
        let props = "\
# transport
mailforge.transportstrategy=SMTP_TLS
mailforge.smtp.host=smtp.default.com
mailforge.smtp.port=25
mailforge.smtp.username=username smtp
mailforge.smtp.password=password smtp
mailforge.proxy.host=proxy.default.com
mailforge.proxy.port=1080
mailforge.proxy.socksbridge.port=1081
mailforge.opportunistic.tls=false
";
        load_config(Cursor::new(props), true).unwrap();
        let config = snapshot();
        assert_eq!(config.transport_strategy, Some(TransportStrategy::SmtpTls));
        assert_eq!(config.smtp_host.as_deref(), Some("smtp.default.com"));
        assert_eq!(config.smtp_port, Some(25));
        assert_eq!(config.smtp_username.as_deref(), Some("username smtp"));
        assert_eq!(config.proxy_bridge_port, Some(1081));
        assert_eq!(config.opportunistic_tls, Some(false));
        assert_eq!(config.debug, None);
    }

    #[test]
    fn merge_mode_keeps_values_the_new_source_does_not_mention() {
        let _guard = locked();
        load_config(Cursor::new("mailforge.smtp.host=first.example.com"), true).unwrap();
        load_config(Cursor::new("mailforge.smtp.port=587"), false).unwrap();
        let config = snapshot();
        assert_eq!(config.smtp_host.as_deref(), Some("first.example.com"));
        assert_eq!(config.smtp_port, Some(587));

        load_config(Cursor::new("mailforge.smtp.port=25"), true).unwrap();
        assert_eq!(snapshot().smtp_host, None);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let _guard = locked();
        let err = load_config(Cursor::new("mailforge.smtp.port=not-a-port"), true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
        let err =
            load_config(Cursor::new("mailforge.opportunistic.tls=maybe"), true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let _guard = locked();
        load_config(
            Cursor::new("\n# comment\n! also a comment\nmailforge.debug=true\n"),
            true,
        )
        .unwrap();
        assert_eq!(snapshot().debug, Some(true));
    }

    #[test]
    fn environment_variables_override_the_properties_source() {
        let _guard = locked();
        std::env::set_var("MAILFORGE_SMTP_HOST", "env.example.com");
        let result = load_config(
            Cursor::new("mailforge.smtp.host=file.example.com\nmailforge.smtp.port=2525"),
            true,
        );
        std::env::remove_var("MAILFORGE_SMTP_HOST");
        result.unwrap();
        let config = snapshot();
        assert_eq!(config.smtp_host.as_deref(), Some("env.example.com"));
        // Keys without an environment override keep the file value.
        assert_eq!(config.smtp_port, Some(2525));
    }

    #[test]
    fn config_file_round_trip() {
        let _guard = locked();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mailforge.smtp.host=file.example.com").unwrap();
        writeln!(file, "mailforge.smtp.port=2525").unwrap();
        file.flush().unwrap();
        load_config_file(file.path()).unwrap();
        let config = snapshot();
        assert_eq!(config.smtp_host.as_deref(), Some("file.example.com"));
        assert_eq!(config.smtp_port, Some(2525));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let _guard = locked();
        let err = load_config_file("/definitely/not/here.properties").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingConfiguration);
    }
}
