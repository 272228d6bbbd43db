use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntoTocPathError {
    UnrepresentableStr,
}

impl std::error::Error for IntoTocPathError {}

impl fmt::Display for IntoTocPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl IntoTocPathError {
    pub fn as_str(&self) -> &str {
        match self {
            IntoTocPathError::UnrepresentableStr => "unrepresentable string found in path",
        }
    }
}
