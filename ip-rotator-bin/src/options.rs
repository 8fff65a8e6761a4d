use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Parser, Subcommand};
use const_format::{concatcp, formatcp};
use ip_rotator_lib::{
    DEFAULT_USER_AGENT, ProvisionPolicy, RegionPreset, Selection, StaticCredentials, Target,
};
use log::warn;
use secrecy::SecretString;
use serde::Deserialize;
use strum::{Display, EnumString, VariantNames};
use url::Url;

use crate::verbosity::Verbosity;

pub(crate) const IP_ROTATOR_CONFIG_FILE: &str = "ip-rotator.toml";

const DEFAULT_TIMEOUT_SECS: u64 = 20;

// clap wants `&str` defaults, serde wants typed ones
const TIMEOUT_STR: &str = concatcp!(DEFAULT_TIMEOUT_SECS);
// The default is only shown in the help text so that a missing default file
// can be told apart from a missing explicit one.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    IP_ROTATOR_CONFIG_FILE,
);

/// Whether to color the output
#[derive(Debug, Deserialize, Default, Clone, Display, EnumString, VariantNames, PartialEq, Eq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OutputMode {
    /// Colored status codes and log levels
    #[default]
    Color,
    /// No escape codes, e.g. for piping into other programs
    Plain,
}

impl OutputMode {
    /// Returns `true` if the output should not be colored
    pub(crate) const fn is_plain(&self) -> bool {
        matches!(self, OutputMode::Plain)
    }
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            fn $name() -> $T {
                $e
            }
        )*
    };
}

default_function! {
    timeout: u64 = DEFAULT_TIMEOUT_SECS;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
}

// Take a value from the config file unless it was set on the command line,
// i.e. unless the CLI value differs from its default.
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// ip-rotator sends HTTP requests through AWS API Gateway endpoints in
/// several regions, so that the target sees them coming from many addresses.
///
/// Gateways are created for the duration of a command and removed again
/// afterwards. Use `sweep` to remove gateways left behind by an interrupted
/// run.
#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct IpRotatorOptions {
    #[command(subcommand)]
    pub(crate) command: Command,

    /// Configuration file to use
    #[arg(short, long = "config", global = true)]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Deploy gateways, fetch URLs of the target through them and remove
    /// the gateways again
    Fetch(FetchArgs),

    /// Remove gateways of the target left behind by earlier runs
    Sweep {
        /// Origin the gateways forward to, e.g. `https://ipinfo.io`
        target: Target,
    },

    /// List the existing gateways of the target
    List {
        /// Origin the gateways forward to, e.g. `https://ipinfo.io`
        target: Target,
    },

    /// Print the regions of a preset
    Regions {
        /// Preset to print
        #[arg(
            default_value = "default",
            value_parser = PossibleValuesParser::new(RegionPreset::VARIANTS)
                .try_map(|s| s.parse::<RegionPreset>())
        )]
        preset: RegionPreset,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct FetchArgs {
    /// Origin to fetch from, e.g. `https://ipinfo.io`
    pub(crate) target: Target,

    /// Paths on the target (or full URLs on the target) to fetch
    ///
    /// Without paths, the root of the target is fetched.
    pub(crate) paths: Vec<String>,

    /// Fetch every URL this many times
    #[arg(short = 'n', long, default_value_t = 1)]
    pub(crate) repeat: usize,

    /// Print response bodies
    #[arg(long)]
    pub(crate) body: bool,
}

impl FetchArgs {
    /// The URLs to fetch, resolved against the target
    pub(crate) fn urls(&self) -> Result<Vec<Url>> {
        let target = &self.target;
        if self.paths.is_empty() {
            return Ok(vec![target.as_url().clone()]);
        }

        self.paths
            .iter()
            .map(|path| {
                let url = if path.contains("://") {
                    Url::parse(path)
                } else {
                    target.as_url().join(path)
                }
                .with_context(|| format!("Cannot build URL from `{path}`"))?;
                if !target.matches(&url) {
                    bail!("`{url}` is not on {target}; the gateways only forward to the target");
                }
                Ok(url)
            })
            .collect()
    }
}

/// Options shared by all commands
#[derive(clap::Args, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[clap(flatten)]
    #[serde(default)]
    pub(crate) verbose: Verbosity,

    /// Regions to deploy gateways to, comma separated
    ///
    /// Takes precedence over `--preset`.
    #[arg(long, value_delimiter = ',', global = true)]
    #[serde(default)]
    pub(crate) regions: Vec<String>,

    /// Named set of regions to deploy gateways to
    #[arg(
        long,
        global = true,
        value_parser = PossibleValuesParser::new(RegionPreset::VARIANTS)
            .try_map(|s| s.parse::<RegionPreset>())
    )]
    #[serde(default)]
    pub(crate) preset: Option<RegionPreset>,

    /// AWS access key id
    ///
    /// Without access key, the default AWS credential chain is used
    /// (profile, SSO, instance metadata).
    #[arg(long, env = "AWS_ACCESS_KEY_ID", global = true)]
    #[serde(default)]
    pub(crate) access_key_id: Option<String>,

    /// AWS secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    #[serde(default)]
    pub(crate) secret_access_key: Option<SecretString>,

    /// AWS session token, for temporary credentials
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true, global = true)]
    #[serde(default)]
    pub(crate) session_token: Option<SecretString>,

    /// What to do if some regions cannot be provisioned
    #[arg(
        long,
        global = true,
        default_value = "all-or-nothing",
        value_parser = PossibleValuesParser::new(ProvisionPolicy::VARIANTS)
            .try_map(|s| s.parse::<ProvisionPolicy>())
    )]
    #[serde(default)]
    pub(crate) policy: ProvisionPolicy,

    /// How to pick the gateway of each request
    #[arg(
        long,
        global = true,
        default_value = "round-robin",
        value_parser = PossibleValuesParser::new(Selection::VARIANTS)
            .try_map(|s| s.parse::<Selection>())
    )]
    #[serde(default)]
    pub(crate) selection: Selection,

    /// Do not touch AWS: gateways are only simulated and requests go to the
    /// target directly
    #[arg(long, global = true)]
    #[serde(default)]
    pub(crate) dry_run: bool,

    /// Response timeout per request in seconds
    #[arg(long, global = true, default_value = &TIMEOUT_STR)]
    #[serde(default = "timeout")]
    pub(crate) timeout: u64,

    /// User agent of the requests
    #[arg(long, global = true, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Output display mode
    #[arg(
        long,
        global = true,
        default_value = "color",
        value_parser = PossibleValuesParser::new(OutputMode::VARIANTS)
            .try_map(|s| s.parse::<OutputMode>())
    )]
    #[serde(default)]
    pub(crate) mode: OutputMode,
}

impl Config {
    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // Secrets are not comparable, so they are merged by hand
        if self.secret_access_key.is_none() && toml.secret_access_key.is_some() {
            self.secret_access_key = toml.secret_access_key;
        }
        if self.session_token.is_none() && toml.session_token.is_some() {
            self.session_token = toml.session_token;
        }

        fold_in! {
            self, toml;

            Config {
                ..secret_access_key,
                ..session_token,

                access_key_id: None,
                dry_run: false,
                mode: OutputMode::Color,
                policy: ProvisionPolicy::default(),
                preset: None,
                regions: Vec::<String>::new(),
                selection: Selection::default(),
                timeout: DEFAULT_TIMEOUT_SECS,
                user_agent: DEFAULT_USER_AGENT,
                verbose: Verbosity::default(),
            }
        }
    }

    /// Regions to deploy to: the explicit list, else the preset
    pub(crate) fn regions(&self) -> Vec<String> {
        if !self.regions.is_empty() {
            return self.regions.clone();
        }
        self.preset
            .unwrap_or_default()
            .regions()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Static credentials, if configured
    ///
    /// # Errors
    ///
    /// Fails if only one of access key id and secret access key is set.
    pub(crate) fn credentials(&self) -> Result<Option<StaticCredentials>> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Some(StaticCredentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                session_token: self.session_token.clone(),
            })),
            (None, None) => {
                if self.session_token.is_some() {
                    warn!("Ignoring session token without access key");
                }
                Ok(None)
            }
            (Some(_), None) => bail!("An access key id needs a secret access key"),
            (None, Some(_)) => bail!("A secret access key needs an access key id"),
        }
    }

    pub(crate) const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
