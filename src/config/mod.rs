pub mod loader;
pub mod schema;

pub use loader::{
    discover, load_from_path, load_from_str, ConfigError, ConfigOrigin, DEFAULT_CONFIG_FILE,
};
pub use schema::{
    Config, InstrumentSettings, Mode, ReportStream, ValidationError, ValidationIssue,
};
