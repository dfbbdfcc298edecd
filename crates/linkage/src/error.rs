use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (threshold out of range, empty column list, etc.).
    Configuration(String),
    /// Missing or malformed field in one of the input record sets.
    Schema { source: String, message: String },
    /// None of the requested blocking keys exist in the projected schema.
    CandidateGeneration(String),
    /// A training pass could not run or produced unusable numbers.
    Training { pass: String, message: String },
    /// CSV read error at the normalizer boundary.
    Io(String),
}

impl LinkError {
    pub(crate) fn schema(source: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            source: source.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn training(pass: &str, message: impl Into<String>) -> Self {
        Self::Training {
            pass: pass.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::Configuration(msg) => write!(f, "config validation error: {msg}"),
            Self::Schema { source, message } => write!(f, "schema error in '{source}': {message}"),
            Self::CandidateGeneration(msg) => write!(f, "candidate generation error: {msg}"),
            Self::Training { pass, message } => {
                write!(f, "training error (pass '{pass}'): {message}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for LinkError {}
