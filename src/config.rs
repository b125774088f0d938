/// Application configuration: defaults, `.env` and environment, validation.

use std::str::FromStr;
use std::time::Duration;

use crate::comms::tcp::RetryPolicy;
use crate::error::{ExchangeError, Result};
use crate::exchange::ExchangeConfig;

pub const DEFAULT_STOP_CONDITION: u32 = 20;
pub const DEFAULT_STOP_CONDITION_MAX: u32 = 1000;
pub const DEFAULT_INITIAL_MESSAGE: &str = "Hi";
pub const DEFAULT_INITIAL_MESSAGE_MAX: usize = 1000;
pub const DEFAULT_PORT: u16 = 8081;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub stop_condition: u32,
    /// Upper bound on `stop_condition`, limiting how large payloads can grow.
    pub stop_condition_max: u32,
    pub initial_message: String,
    pub initial_message_max: usize,
    pub verbose: bool,
    pub host: String,
    pub port: u16,
    pub connect_retry: Duration,
    pub connect_timeout: Duration,
    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stop_condition: DEFAULT_STOP_CONDITION,
            stop_condition_max: DEFAULT_STOP_CONDITION_MAX,
            initial_message: DEFAULT_INITIAL_MESSAGE.to_string(),
            initial_message_max: DEFAULT_INITIAL_MESSAGE_MAX,
            verbose: true,
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_retry: crate::comms::tcp::DEFAULT_RETRY_DELAY,
            connect_timeout: crate::comms::tcp::DEFAULT_MAX_WAIT,
            log_dir: "logs".to_string(),
        }
    }
}

impl Config {
    /// Load from a `.env` file (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            stop_condition: parse(&lookup, "EXCHANGE_STOP_CONDITION", defaults.stop_condition)?,
            stop_condition_max: parse(
                &lookup,
                "EXCHANGE_STOP_CONDITION_MAX",
                defaults.stop_condition_max,
            )?,
            initial_message: lookup("EXCHANGE_INITIAL_MESSAGE").unwrap_or(defaults.initial_message),
            initial_message_max: parse(
                &lookup,
                "EXCHANGE_INITIAL_MESSAGE_MAX",
                defaults.initial_message_max,
            )?,
            verbose: match lookup("EXCHANGE_VERBOSE") {
                Some(raw) => parse_bool("EXCHANGE_VERBOSE", &raw)?,
                None => defaults.verbose,
            },
            host: lookup("EXCHANGE_HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "EXCHANGE_PORT", defaults.port)?,
            connect_retry: Duration::from_millis(parse(
                &lookup,
                "EXCHANGE_CONNECT_RETRY_MS",
                defaults.connect_retry.as_millis() as u64,
            )?),
            connect_timeout: Duration::from_millis(parse(
                &lookup,
                "EXCHANGE_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout.as_millis() as u64,
            )?),
            log_dir: lookup("EXCHANGE_LOG_DIR").unwrap_or(defaults.log_dir),
        })
    }

    /// Range checks. Run after all overrides have been applied.
    pub fn validate(&self) -> Result<()> {
        if self.stop_condition < 1 || self.stop_condition > self.stop_condition_max {
            return Err(ExchangeError::Configuration(format!(
                "invalid stop condition {}; allowed range is 1 to {}",
                self.stop_condition, self.stop_condition_max
            )));
        }
        if self.initial_message.chars().count() > self.initial_message_max {
            return Err(ExchangeError::Configuration(format!(
                "maximum allowed length of initial message is {}",
                self.initial_message_max
            )));
        }
        if self.initial_message.contains(['\n', '\r']) {
            return Err(ExchangeError::Configuration(
                "initial message must be a single line".to_string(),
            ));
        }
        if self.connect_retry.is_zero() {
            return Err(ExchangeError::Configuration(
                "connect retry delay must be positive".to_string(),
            ));
        }
        if self.connect_timeout < self.connect_retry {
            return Err(ExchangeError::Configuration(format!(
                "connect timeout {:?} is shorter than the retry delay {:?}",
                self.connect_timeout, self.connect_retry
            )));
        }
        Ok(())
    }

    /// The responder and initiator run in separate processes and must agree
    /// on a fixed port. Only the in-process pair may let the OS pick one.
    pub fn validate_socket_port(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ExchangeError::Configuration(
                "invalid port number; valid range is 1 - 65535".to_string(),
            ));
        }
        Ok(())
    }

    /// Longest line a well-behaved peer can send: the initial message plus
    /// one " <count>" suffix per hop, two hops per round.
    pub fn max_line_len(&self) -> usize {
        let digits = self.stop_condition_max.to_string().len();
        let hops = 2 * self.stop_condition_max as usize + 1;
        // Four bytes per char covers any UTF-8 initial message.
        self.initial_message_max * 4 + hops * (digits + 1)
    }

    /// Validate and derive the parameters the core runs with.
    pub fn exchange_config(&self) -> Result<ExchangeConfig> {
        self.validate()?;
        Ok(ExchangeConfig {
            stop_condition: self.stop_condition,
            verbose: self.verbose,
            initial_message: self.initial_message.clone(),
            host: self.host.clone(),
            port: self.port,
            retry: RetryPolicy {
                delay: self.connect_retry,
                max_wait: self.connect_timeout,
            },
            max_line_len: self.max_line_len(),
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            ExchangeError::Configuration(format!("{} must be a valid number: {}", key, e))
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ExchangeError::Configuration(format!(
            "{} must be true or false, got {:?}",
            key, other
        ))),
    }
}
