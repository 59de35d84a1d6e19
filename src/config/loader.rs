use crate::config::schema::{Config, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "tinyprof.toml";

/// Where a piece of configuration text was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Inline,
    File(PathBuf),
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Inline => f.write_str("inline config"),
            ConfigOrigin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("couldn't read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin}: not a valid tinyprof config: {source}")]
    Toml {
        origin: ConfigOrigin,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("{origin}: {source}")]
    Validation {
        origin: ConfigOrigin,
        #[source]
        source: ValidationError,
    },
}

fn parse(input: &str, origin: ConfigOrigin) -> Result<Config, ConfigError> {
    let config: Config = match toml_edit::de::from_str(input) {
        Ok(config) => config,
        Err(source) => return Err(ConfigError::Toml { origin, source }),
    };
    match config.validate() {
        Ok(()) => Ok(config),
        Err(source) => Err(ConfigError::Validation { origin, source }),
    }
}

pub fn load_from_str(input: &str) -> Result<Config, ConfigError> {
    parse(input, ConfigOrigin::Inline)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, ConfigOrigin::File(path.to_path_buf()))
}

/// Resolve the configuration for a run.
///
/// An explicit path must exist. Otherwise `tinyprof.toml` in `dir` is used
/// when present, and the defaults when not.
pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }

    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    if candidate.is_file() {
        tracing::debug!(config = %candidate.display(), "using discovered config");
        return load_from_path(&candidate);
    }

    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Mode, ReportStream};

    #[test]
    fn empty_file_gives_defaults() {
        let config = load_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn full_instrument_table() {
        let config = load_from_str(
            r#"
[instrument]
mode = "sequential"
descriptor = "build/locs"
tick = "read_tsc"
report_stream = "stdout"
validate = false
"#,
        )
        .unwrap();

        let settings = config.instrument;
        assert_eq!(settings.mode, Mode::Sequential);
        assert_eq!(settings.descriptor, PathBuf::from("build/locs"));
        assert_eq!(settings.tick, "read_tsc");
        assert_eq!(settings.report_stream, ReportStream::Stdout);
        assert!(!settings.validate);
    }

    #[test]
    fn unknown_mode_is_a_toml_error() {
        let err = load_from_str("[instrument]\nmode = \"random\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn invalid_tick_is_a_validation_error() {
        let err = load_from_str("[instrument]\ntick = \"rd tsc\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn errors_name_where_the_config_came_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tinyprof.toml");
        fs::write(&path, "[instrument]\ntick = \"\"\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("tinyprof.toml"));
        assert!(matches!(
            err,
            ConfigError::Validation { origin: ConfigOrigin::File(ref p), .. } if *p == path
        ));

        let err = load_from_str("[instrument\n").unwrap_err();
        assert!(err.to_string().starts_with("inline config: "));
        assert!(matches!(
            err,
            ConfigError::Toml {
                origin: ConfigOrigin::Inline,
                ..
            }
        ));
    }

    #[test]
    fn discover_prefers_explicit_then_local_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover(None, dir.path()).unwrap(), Config::default());

        fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[instrument]\nmode = \"sequential\"\n",
        )
        .unwrap();
        assert_eq!(
            discover(None, dir.path()).unwrap().instrument.mode,
            Mode::Sequential
        );

        let missing = dir.path().join("other.toml");
        assert!(matches!(
            discover(Some(&missing), dir.path()),
            Err(ConfigError::Io { .. })
        ));
    }
}
