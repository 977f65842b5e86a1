//! Environment setup keywords: script directives that configure the runtime
//! or perform a side effect instead of addressing the device.
//!
//! Script syntax is `KEYWORD[ attribute]`:
//!
//! | Keyword | Attribute |
//! |---------|-----------|
//! | `DEVICE` | serial device path |
//! | `BAUDRATE` | integer |
//! | `TIMEOUT` | default timeout in seconds |
//! | `BREAK` | `LF`, `CRLF`, `CR` or `NONE` |
//! | `AOF` / `RTSCTS` / `DSRDTR` | `true` or `false`, any case |
//! | `SET` | `key=value` |
//! | `GETENV` | environment variable name |
//! | `PRINT` | text, `${name}` substituted |
//! | `EXEC` | shell command line |
//! | `WRITE` | file path, whitespace, content |

use std::fmt;
use std::str::FromStr;

/// Terminator appended to every command written to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineBreak {
    Lf,
    #[default]
    CrLf,
    Cr,
    None,
}

impl LineBreak {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineBreak::Lf => "\n",
            LineBreak::CrLf => "\r\n",
            LineBreak::Cr => "\r",
            LineBreak::None => "",
        }
    }
}

impl FromStr for LineBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LF" => Ok(LineBreak::Lf),
            "CRLF" => Ok(LineBreak::CrLf),
            "CR" => Ok(LineBreak::Cr),
            "NONE" => Ok(LineBreak::None),
            other => Err(format!("Invalid line break '{other}'")),
        }
    }
}

impl fmt::Display for LineBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LineBreak::Lf => "LF",
            LineBreak::CrLf => "CRLF",
            LineBreak::Cr => "CR",
            LineBreak::None => "NONE",
        })
    }
}

/// A parsed keyword with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Esk {
    Device(String),
    BaudRate(u32),
    Timeout(i64),
    Break(LineBreak),
    Aof(bool),
    Set { key: String, value: String },
    GetEnv(String),
    Print(String),
    Exec(String),
    DsrDtr(bool),
    RtsCts(bool),
    Write { path: String, content: String },
}

/// An ESK together with the command index it runs before: the number of
/// commands that precede it in the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEsk {
    pub esk: Esk,
    pub index: usize,
}

type ParseFn = fn(Option<&str>) -> Option<Esk>;

static REGISTRY: &[(&str, ParseFn)] = &[
    ("DEVICE", parse_device),
    ("BAUDRATE", parse_baud_rate),
    ("TIMEOUT", parse_timeout),
    ("BREAK", parse_break),
    ("AOF", parse_aof),
    ("SET", parse_set),
    ("GETENV", parse_getenv),
    ("PRINT", parse_print),
    ("EXEC", parse_exec),
    ("DSRDTR", parse_dsrdtr),
    ("RTSCTS", parse_rtscts),
    ("WRITE", parse_write),
];

impl Esk {
    /// Whether `word` names one of the keywords.
    pub fn is_keyword(word: &str) -> bool {
        REGISTRY.iter().any(|(name, _)| *name == word)
    }

    /// Build an ESK from its keyword and attribute string.
    ///
    /// An empty attribute is treated as missing. Returns an error message for
    /// unknown keywords and for attributes the keyword does not accept.
    pub fn parse(keyword: &str, attr: Option<&str>) -> Result<Esk, String> {
        let attr = attr.map(str::trim).filter(|a| !a.is_empty());
        let (_, parse) = REGISTRY
            .iter()
            .find(|(name, _)| *name == keyword)
            .ok_or_else(|| format!("Unknown keyword: {keyword}"))?;
        parse(attr).ok_or_else(|| "Invalid attributes".to_string())
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Esk::Device(_) => "DEVICE",
            Esk::BaudRate(_) => "BAUDRATE",
            Esk::Timeout(_) => "TIMEOUT",
            Esk::Break(_) => "BREAK",
            Esk::Aof(_) => "AOF",
            Esk::Set { .. } => "SET",
            Esk::GetEnv(_) => "GETENV",
            Esk::Print(_) => "PRINT",
            Esk::Exec(_) => "EXEC",
            Esk::DsrDtr(_) => "DSRDTR",
            Esk::RtsCts(_) => "RTSCTS",
            Esk::Write { .. } => "WRITE",
        }
    }
}

impl fmt::Display for Esk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kw = self.keyword();
        match self {
            Esk::Device(v) | Esk::GetEnv(v) | Esk::Print(v) | Esk::Exec(v) => {
                write!(f, "{kw} {v}")
            }
            Esk::BaudRate(v) => write!(f, "{kw} {v}"),
            Esk::Timeout(v) => write!(f, "{kw} {v}"),
            Esk::Break(v) => write!(f, "{kw} {v}"),
            Esk::Aof(v) | Esk::DsrDtr(v) | Esk::RtsCts(v) => write!(f, "{kw} {v}"),
            Esk::Set { key, value } => write!(f, "{kw} {key}={value}"),
            Esk::Write { path, content } => write!(f, "{kw} {path} {content}"),
        }
    }
}

fn parse_bool(attr: &str) -> Option<bool> {
    match attr.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_device(attr: Option<&str>) -> Option<Esk> {
    Some(Esk::Device(attr?.to_string()))
}

fn parse_baud_rate(attr: Option<&str>) -> Option<Esk> {
    attr?.parse().ok().map(Esk::BaudRate)
}

fn parse_timeout(attr: Option<&str>) -> Option<Esk> {
    attr?.parse().ok().map(Esk::Timeout)
}

fn parse_break(attr: Option<&str>) -> Option<Esk> {
    attr?.parse().ok().map(Esk::Break)
}

fn parse_aof(attr: Option<&str>) -> Option<Esk> {
    parse_bool(attr?).map(Esk::Aof)
}

fn parse_dsrdtr(attr: Option<&str>) -> Option<Esk> {
    parse_bool(attr?).map(Esk::DsrDtr)
}

fn parse_rtscts(attr: Option<&str>) -> Option<Esk> {
    parse_bool(attr?).map(Esk::RtsCts)
}

fn parse_getenv(attr: Option<&str>) -> Option<Esk> {
    Some(Esk::GetEnv(attr?.to_string()))
}

fn parse_print(attr: Option<&str>) -> Option<Esk> {
    Some(Esk::Print(attr?.to_string()))
}

fn parse_exec(attr: Option<&str>) -> Option<Esk> {
    Some(Esk::Exec(attr?.to_string()))
}

fn parse_set(attr: Option<&str>) -> Option<Esk> {
    let mut parts = attr?.split('=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(value), None) => Some(Esk::Set {
            key: key.to_string(),
            value: value.to_string(),
        }),
        _ => None,
    }
}

fn parse_write(attr: Option<&str>) -> Option<Esk> {
    let (path, content) = attr?.split_once(char::is_whitespace)?;
    let content = content.trim_start();
    if content.is_empty() {
        return None;
    }
    Some(Esk::Write {
        path: path.to_string(),
        content: content.to_string(),
    })
}
