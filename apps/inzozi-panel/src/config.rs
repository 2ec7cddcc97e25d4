use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::str::FromStr;

const CONFIG_PATHS: [&str; 2] = ["/etc/inzozi/panel.toml", "./panel.toml"];
const MAX_TERM_DAYS: u32 = 3650;
const MAX_INSTALLMENTS: u32 = 360;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    pub session_secret: String,
    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
    #[serde(default)]
    pub loan: LoanTerms,
    #[serde(default)]
    pub membership: MembershipConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Terms written onto every loan when it is approved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanTerms {
    pub interest_rate: f64,
    pub installments_count: u32,
    pub term_days: u32,
}

impl Default for LoanTerms {
    fn default() -> Self {
        Self {
            interest_rate: 0.05,
            installments_count: 3,
            term_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    pub required_amount: i64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            required_amount: 105_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Daily rolling log files are written here when set.
    pub directory: Option<String>,
}

fn default_listen_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    20
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

impl PanelConfig {
    /// Configuration with every default and the given signing secret.
    pub fn new(session_secret: impl Into<String>) -> Self {
        Self {
            database_url: None,
            listen_port: default_listen_port(),
            session_secret: session_secret.into(),
            db_max_connections: default_max_connections(),
            loan: LoanTerms::default(),
            membership: MembershipConfig::default(),
            sweep: SweepConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Loads the first config file found, falling back to the environment.
    /// Returns the config and where it came from.
    pub fn load() -> Result<(Self, String)> {
        dotenvy::dotenv().ok();

        for path in CONFIG_PATHS {
            if let Ok(contents) = fs::read_to_string(path) {
                let config = Self::from_toml(&contents)
                    .with_context(|| format!("Invalid config file {}", path))?;
                return Ok((config, path.to_string()));
            }
        }

        Ok((Self::from_env()?, "environment".to_string()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn from_env() -> Result<Self> {
        let defaults = LoanTerms::default();
        let config = Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            listen_port: std::env::var("LISTEN_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(default_listen_port),
            session_secret: std::env::var("SESSION_SECRET")
                .context("SESSION_SECRET must be set")?,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", default_max_connections())?,
            loan: LoanTerms {
                interest_rate: env_parse("LOAN_INTEREST_RATE", defaults.interest_rate)?,
                installments_count: env_parse("LOAN_INSTALLMENTS", defaults.installments_count)?,
                term_days: env_parse("LOAN_TERM_DAYS", defaults.term_days)?,
            },
            membership: MembershipConfig {
                required_amount: env_parse(
                    "MEMBERSHIP_REQUIRED_AMOUNT",
                    MembershipConfig::default().required_amount,
                )?,
            },
            sweep: SweepConfig {
                interval_secs: env_parse(
                    "SWEEP_INTERVAL_SECS",
                    SweepConfig::default().interval_secs,
                )?,
            },
            log: LogConfig {
                directory: std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_secret.trim().is_empty() {
            bail!("session_secret must not be empty");
        }
        if !(0.0..=1.0).contains(&self.loan.interest_rate) {
            bail!(
                "loan.interest_rate must be between 0 and 1, got {}",
                self.loan.interest_rate
            );
        }
        if !(1..=MAX_INSTALLMENTS).contains(&self.loan.installments_count) {
            bail!(
                "loan.installments_count must be between 1 and {}, got {}",
                MAX_INSTALLMENTS,
                self.loan.installments_count
            );
        }
        if !(1..=MAX_TERM_DAYS).contains(&self.loan.term_days) {
            bail!(
                "loan.term_days must be between 1 and {}, got {}",
                MAX_TERM_DAYS,
                self.loan.term_days
            );
        }
        if self.membership.required_amount <= 0 {
            bail!("membership.required_amount must be positive");
        }
        if self.sweep.interval_secs == 0 {
            bail!("sweep.interval_secs must be positive");
        }
        if self.db_max_connections == 0 {
            bail!("db_max_connections must be positive");
        }
        Ok(())
    }
}
