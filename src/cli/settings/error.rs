use thiserror::Error;

/// Why a `set`/`unset` invocation was rejected. Nothing is saved on error.
#[derive(Debug, Error, PartialEq)]
pub enum SettingError {
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Unknown provider: {input}")]
    UnknownProvider { input: String },

    #[error("Invalid value for {key}: {input}")]
    InvalidValue {
        key: &'static str,
        input: String,
        expected: &'static str,
    },

    #[error("Invalid boolean value: {0}")]
    InvalidBoolean(String),

    #[error("{hint}")]
    MissingArgs {
        hint: &'static str,
        example: &'static str,
    },
}

impl SettingError {
    /// Follow-up line telling the user what would have been accepted.
    pub fn hint(&self) -> String {
        match self {
            SettingError::UnknownKey(_) => {
                "Run 'chatwire set' to see the available keys.".to_string()
            }
            SettingError::UnknownProvider { .. } => {
                "Run 'chatwire providers' to list available providers.".to_string()
            }
            SettingError::InvalidValue { expected, .. } => format!("Expected {expected}"),
            SettingError::InvalidBoolean(_) => {
                "Use 'on' or 'off' (also accepts true/false, yes/no)".to_string()
            }
            SettingError::MissingArgs { example, .. } => format!("Example: {example}"),
        }
    }

    pub fn print(&self) {
        let marker = match self {
            SettingError::MissingArgs { .. } => "⚠️ ",
            _ => "❌",
        };
        eprintln!("{marker} {self}");
        eprintln!("   {}", self.hint());
    }
}
