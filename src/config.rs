//! Settings for the loader, router and server, from an optional JSON
//! file, overridden by environment variables.

use std::{env::VarError, path::{Path, PathBuf}};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

pub const ENV_SEARCH_PATH: &str = "CHTML_SEARCH_PATH";
pub const ENV_LISTEN: &str = "CHTML_LISTEN";
pub const ENV_TRACE: &str = "CHTML_TRACE";
pub const ENV_VERBOSE: &str = "CHTML_VERBOSE";

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directories searched for components after the importing
    /// document's own directory, in order.
    pub search_path: Vec<PathBuf>,
    pub listen: String,
    /// Print `dt!` call traces.
    pub trace: bool,
    /// Log loading and sessions.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            search_path: Vec::new(),
            listen: DEFAULT_LISTEN.into(),
            trace: false,
            verbose: false,
        }
    }
}

/// Get an env var as a String; decoding failures are reported as
/// errors.
pub fn getenv(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(s) => Ok(Some(s)),
        Err(e) => match e {
            VarError::NotPresent => Ok(None),
            VarError::NotUnicode(_) => bail!("{name:?} env var is not unicode"),
        }
    }
}

fn parse_bool(name: &str, s: &str) -> Result<bool> {
    match s {
        "" | "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        _ => bail!("{name:?} env var: expecting 0 or 1, got {s:?}")
    }
}

impl Config {
    pub fn from_json(s: &str) -> Result<Config> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let s = std::fs::read_to_string(path).with_context(
            || anyhow!("reading config file {:?}", path))?;
        Config::from_json(&s).with_context(|| anyhow!("config file {:?}", path))
    }

    /// Apply the overrides from `getenv` (taking a variable name);
    /// `CHTML_SEARCH_PATH` is colon separated and replaces the
    /// configured search path.
    pub fn apply_env_with(mut self, getenv: impl Fn(&str) -> Result<Option<String>>)
                          -> Result<Config> {
        if let Some(s) = getenv(ENV_SEARCH_PATH)? {
            self.search_path = s.split(':').filter(|p| !p.is_empty()).map(PathBuf::from).collect();
        }
        if let Some(s) = getenv(ENV_LISTEN)? {
            self.listen = s;
        }
        if let Some(s) = getenv(ENV_TRACE)? {
            self.trace = parse_bool(ENV_TRACE, &s)?;
        }
        if let Some(s) = getenv(ENV_VERBOSE)? {
            self.verbose = parse_bool(ENV_VERBOSE, &s)?;
        }
        Ok(self)
    }

    pub fn apply_env(self) -> Result<Config> {
        self.apply_env_with(getenv)
    }

    /// The file if given, else defaults; then the environment.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let config = match path {
            Some(p) => Config::from_file(p)?,
            None => Config::default(),
        };
        config.apply_env()
    }

    /// Switch on the logging this config asks for.
    pub fn install_logging(&self) {
        crate::dt::set_enabled(self.trace);
        crate::warn::set_verbose(self.verbose);
    }
}
