use std::fmt;

/// API credential for a backend. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short description safe to put in logs.
    pub fn redacted(&self) -> String {
        match self.0.get(..4) {
            Some(prefix) if self.0.len() > 10 => format!("PRESENT ({prefix}...)"),
            _ => "PRESENT".to_string(),
        }
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}
