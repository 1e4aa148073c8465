use std::fmt;

/// A script syntax error, rendered as `chunk:line: message`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub chunk: String,
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(chunk: &str, line: u32, message: impl Into<String>) -> Self {
        Diagnostic {
            chunk: chunk.to_string(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.chunk, self.line, self.message)
    }
}

impl std::error::Error for Diagnostic {}
