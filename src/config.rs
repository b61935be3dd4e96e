//! Runtime configuration: a small directive file merged with command-line
//! flags. Everything is resolved once at startup and immutable afterwards.
//!
//! File format: one `key value` directive per line, split on the first
//! whitespace run; `#` starts a comment; blank lines are ignored; keys are
//! case-insensitive. Unknown keys warn and are skipped so old configs keep
//! working; out-of-range values are a hard error.

use crate::errors::ConfigError;
use clap::Parser;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Command-line flags. Every flag overrides its config-file counterpart.
#[derive(Debug, Parser, Default)]
#[command(name = "miniweb", about = "Host diagnostics over HTTP", disable_version_flag = true)]
pub struct Cli {
    /// Listening port
    #[arg(short = 'p', value_name = "PORT")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', value_name = "BIND")]
    pub bind: Option<String>,

    /// Worker task count
    #[arg(short = 't', value_name = "THREADS")]
    pub threads: Option<usize>,

    /// Connection slot count
    #[arg(short = 'c', value_name = "MAX_CONNECTIONS")]
    pub max_conns: Option<usize>,

    /// Debug-level logging
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Explicit configuration file
    #[arg(short = 'f', value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub threads: usize,
    pub max_conns: usize,
    pub conn_timeout: Duration,
    pub max_req_size: usize,
    pub mandoc_timeout: Duration,
    pub static_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub mandoc_path: PathBuf,
    pub man_path: PathBuf,
    pub trusted_proxy: Option<IpAddr>,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "127.0.0.1".to_string(),
            threads: 4,
            max_conns: 1280,
            conn_timeout: Duration::from_secs(60),
            max_req_size: 16 * 1024,
            mandoc_timeout: Duration::from_secs(10),
            static_dir: PathBuf::from("./static"),
            templates_dir: PathBuf::from("./templates"),
            mandoc_path: PathBuf::from("/usr/bin/mandoc"),
            man_path: PathBuf::from("/usr/bin/man"),
            trusted_proxy: None,
            verbose: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Resolves the effective configuration: defaults, then the first
    /// config file found, then CLI overrides.
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = Self::locate_file(cli.config.as_deref()) {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            config.apply_file(&text)?;
        } else if let Some(explicit) = &cli.config {
            // An explicitly named file must exist; the search-path
            // candidates are all optional.
            return Err(ConfigError::Unreadable {
                path: explicit.display().to_string(),
                reason: "not found".to_string(),
            });
        }

        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(bind) = cli.bind {
            config.bind = bind;
        }
        if let Some(threads) = cli.threads {
            config.threads = in_range("threads", threads, 1, 64)?;
        }
        if let Some(max_conns) = cli.max_conns {
            config.max_conns = in_range("max_conns", max_conns, 1, 65535)?;
        }
        config.verbose |= cli.verbose;

        Ok(config)
    }

    /// Lookup order: explicit `-f`, `./miniweb.conf`, `$HOME/.miniweb.conf`,
    /// `/etc/miniweb.conf`. First hit wins.
    fn locate_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return path.exists().then(|| path.to_path_buf());
        }

        let mut candidates = vec![PathBuf::from("./miniweb.conf")];
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(Path::new(&home).join(".miniweb.conf"));
        }
        candidates.push(PathBuf::from("/etc/miniweb.conf"));

        candidates.into_iter().find(|p| p.is_file())
    }

    fn apply_file(&mut self, text: &str) -> Result<(), ConfigError> {
        for raw_line in text.lines() {
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k.to_ascii_lowercase(), v.trim()),
                None => (line.to_ascii_lowercase(), ""),
            };

            self.apply_directive(&key, value)?;
        }
        Ok(())
    }

    fn apply_directive(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "port" => self.port = parse_ranged("port", value, 1, 65535)? as u16,
            "bind" => self.bind = value.to_string(),
            "threads" => self.threads = parse_ranged("threads", value, 1, 64)? as usize,
            "max_conns" => self.max_conns = parse_ranged("max_conns", value, 1, 65535)? as usize,
            "conn_timeout" => {
                self.conn_timeout =
                    Duration::from_secs(parse_ranged("conn_timeout", value, 1, 3600)?)
            }
            "max_req_size" => {
                self.max_req_size = parse_ranged("max_req_size", value, 1024, 1_048_576)? as usize
            }
            "mandoc_timeout" => {
                self.mandoc_timeout =
                    Duration::from_secs(parse_ranged("mandoc_timeout", value, 1, 120)?)
            }
            "static_dir" => self.static_dir = PathBuf::from(value),
            "templates_dir" => self.templates_dir = PathBuf::from(value),
            "mandoc_path" => self.mandoc_path = PathBuf::from(value),
            "man_path" => self.man_path = PathBuf::from(value),
            "trusted_proxy" => {
                self.trusted_proxy = Some(value.parse().map_err(|_| ConfigError::Invalid {
                    key: "trusted_proxy",
                    value: value.to_string(),
                })?)
            }
            "verbose" => self.verbose = parse_bool("verbose", value)?,
            "log_file" => self.log_file = Some(PathBuf::from(value)),
            other => warn!(key = other, "ignoring unknown config directive"),
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_ranged(key: &'static str, value: &str, min: u64, max: u64) -> Result<u64, ConfigError> {
    let parsed: u64 = value.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })?;
    if parsed < min || parsed > max {
        return Err(ConfigError::OutOfRange {
            key,
            value: value.to_string(),
            range: range_text(key),
        });
    }
    Ok(parsed)
}

fn in_range(key: &'static str, value: usize, min: usize, max: usize) -> Result<usize, ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key,
            value: value.to_string(),
            range: range_text(key),
        });
    }
    Ok(value)
}

fn range_text(key: &str) -> &'static str {
    match key {
        "port" => "1..65535",
        "threads" => "1..64",
        "max_conns" => "1..65535",
        "conn_timeout" => "1..3600",
        "max_req_size" => "1024..1048576",
        "mandoc_timeout" => "1..120",
        _ => "",
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}


#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli {
            port: Some(9000),
            bind: Some("0.0.0.0".into()),
            threads: Some(2),
            max_conns: Some(64),
            verbose: true,
            config: None,
        };

        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.threads, 2);
        assert_eq!(config.max_conns, 64);
        assert!(config.verbose);
    }

    #[test]
    fn cli_range_checks_apply() {
        let cli = Cli {
            threads: Some(65),
            ..Default::default()
        };
        assert!(Config::resolve(cli).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/miniweb.conf")),
            ..Default::default()
        };
        assert!(Config::resolve(cli).is_err());
    }

    #[test]
    fn parses_short_flags() {
        let cli = Cli::parse_from(["miniweb", "-p", "8081", "-t", "2", "-v"]);
        assert_eq!(cli.port, Some(8081));
        assert_eq!(cli.threads, Some(2));
        assert!(cli.verbose);
    }
}
