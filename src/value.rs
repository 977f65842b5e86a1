//! Values held in the session store.

use std::fmt;

/// A session variable: collected from a response, set by `SET`, or read
/// from the environment by `GETENV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    /// Wide enough for 20-digit identifiers such as an ICCID.
    Int(i128),
}

impl Value {
    /// Integer when the text parses as one, string otherwise.
    pub fn coerce(text: &str) -> Self {
        match text.trim().parse::<i128>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Str(text.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Int(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce() {
        assert_eq!(Value::coerce("31"), Value::Int(31));
        assert_eq!(Value::coerce("-7"), Value::Int(-7));
        assert_eq!(Value::coerce("123456789"), Value::Int(123456789));
        assert_eq!(Value::coerce("READY"), Value::Str("READY".into()));
        assert_eq!(Value::coerce("3.5"), Value::Str("3.5".into()));
    }

    #[test]
    fn test_coerce_iccid() {
        let iccid = Value::coerce("89014103211118510720");
        assert_eq!(iccid, Value::Int(89014103211118510720));
        assert_eq!(iccid.to_string(), "89014103211118510720");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(7782).to_string(), "7782");
        assert_eq!(Value::from("apn.foo.bar").to_string(), "apn.foo.bar");
    }
}
