use crate::{
    models::address::StaticCredentials, services::transfer_service::DEFAULT_WRITE_TIMEOUT,
};
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::{env, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub relay: RelayConfig,
}

/// Everything a consumer run needs. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub queue_url: String,
    pub source_region: String,
    /// `None` means the ambient AWS identity is used.
    pub source_credentials: Option<StaticCredentials>,
    pub dest_bucket: String,
    pub dest_prefix: String,
    pub dest_region: String,
    pub write_timeout: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Relays S3 objects announced on an SQS queue into GCS")]
pub struct Args {
    /// Host to bind to (overrides RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Destination bucket (overrides DEST_BUCKET)
    #[arg(long)]
    pub dest_bucket: Option<String>,

    /// Prefix prepended to every destination key (overrides DEST_PREFIX)
    #[arg(long)]
    pub dest_prefix: Option<String>,

    /// Destination region (overrides DEST_REGION)
    #[arg(long)]
    pub dest_region: Option<String>,

    /// SQS queue URL (overrides SQS_URL)
    #[arg(long)]
    pub queue_url: Option<String>,

    /// Region of the source bucket (overrides SOURCE_AWS_REGION)
    #[arg(long)]
    pub source_region: Option<String>,

    /// Upper bound for writing one object, in seconds (overrides DEST_WRITE_TIMEOUT_SECS)
    #[arg(long)]
    pub write_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name))
    }

    /// Merge CLI args over values from `lookup`. CLI wins, then the
    /// environment, then defaults.
    fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let optional = |name: &str| -> Result<Option<String>> {
            match lookup(name) {
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", name)),
            }
        };
        let required = |arg: Option<String>, name: &str| -> Result<String> {
            match arg {
                Some(value) => Ok(value),
                None => optional(name)?
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| anyhow!("{} must be set", name)),
            }
        };

        let env_port = match optional("PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => 8080,
        };
        let env_timeout = match optional("DEST_WRITE_TIMEOUT_SECS")? {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing DEST_WRITE_TIMEOUT_SECS value `{}`", value))?,
            None => DEFAULT_WRITE_TIMEOUT.as_secs(),
        };

        let relay = RelayConfig {
            queue_url: required(args.queue_url, "SQS_URL")?,
            source_region: required(args.source_region, "SOURCE_AWS_REGION")?,
            source_credentials: StaticCredentials::from_parts(
                &optional("SOURCE_AWS_KEY")?.unwrap_or_default(),
                &optional("SOURCE_AWS_SECRET")?.unwrap_or_default(),
            ),
            dest_bucket: required(args.dest_bucket, "DEST_BUCKET")?,
            dest_prefix: match args.dest_prefix {
                Some(prefix) => prefix,
                None => optional("DEST_PREFIX")?.unwrap_or_default(),
            },
            dest_region: match args.dest_region {
                Some(region) => region,
                None => optional("DEST_REGION")?.unwrap_or_default(),
            },
            write_timeout: Duration::from_secs(args.write_timeout_secs.unwrap_or(env_timeout)),
        };

        Ok(Self {
            host: match args.host {
                Some(host) => host,
                None => optional("RELAY_HOST")?.unwrap_or_else(|| "0.0.0.0".into()),
            },
            port: args.port.unwrap_or(env_port),
            relay,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned().ok_or(env::VarError::NotPresent)
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("SQS_URL", "https://sqs.us-west-1.amazonaws.com/1/q"),
        ("SOURCE_AWS_REGION", "us-west-1"),
        ("DEST_BUCKET", "archive"),
    ];

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let cfg = AppConfig::merge(Args::default(), lookup(&REQUIRED)).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.relay.queue_url, "https://sqs.us-west-1.amazonaws.com/1/q");
        assert_eq!(cfg.relay.dest_bucket, "archive");
        assert_eq!(cfg.relay.dest_prefix, "");
        assert_eq!(cfg.relay.source_credentials, None);
        assert_eq!(cfg.relay.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn reads_every_environment_value() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("RELAY_HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("DEST_PREFIX", "logs/"),
            ("DEST_REGION", "asia-northeast1"),
            ("SOURCE_AWS_KEY", "AKIA"),
            ("SOURCE_AWS_SECRET", "shh"),
            ("DEST_WRITE_TIMEOUT_SECS", "60"),
        ]);
        let cfg = AppConfig::merge(Args::default(), lookup(&vars)).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.relay.dest_prefix, "logs/");
        assert_eq!(cfg.relay.dest_region, "asia-northeast1");
        assert_eq!(
            cfg.relay.source_credentials,
            StaticCredentials::from_parts("AKIA", "shh")
        );
        assert_eq!(cfg.relay.write_timeout, Duration::from_secs(60));
    }

    #[test]
    fn cli_overrides_environment() {
        let args = Args {
            port: Some(1234),
            dest_bucket: Some("cli-bucket".into()),
            dest_prefix: Some("cli/".into()),
            write_timeout_secs: Some(5),
            ..Default::default()
        };
        let mut vars = REQUIRED.to_vec();
        vars.push(("DEST_PREFIX", "env/"));
        let cfg = AppConfig::merge(args, lookup(&vars)).unwrap();
        assert_eq!(cfg.port, 1234);
        assert_eq!(cfg.relay.dest_bucket, "cli-bucket");
        assert_eq!(cfg.relay.dest_prefix, "cli/");
        assert_eq!(cfg.relay.write_timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_required_value_fails() {
        let err = AppConfig::merge(Args::default(), lookup(&REQUIRED[..2])).unwrap_err();
        assert_eq!(err.to_string(), "DEST_BUCKET must be set");
    }

    #[test]
    fn half_set_credentials_fall_back_to_ambient_identity() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SOURCE_AWS_KEY", "AKIA"));
        let cfg = AppConfig::merge(Args::default(), lookup(&vars)).unwrap();
        assert_eq!(cfg.relay.source_credentials, None);
    }

    #[test]
    fn bad_port_is_reported() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PORT", "http"));
        let err = AppConfig::merge(Args::default(), lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("parsing PORT value `http`"));
    }
}
