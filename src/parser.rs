//! Script parser for the AT scripting language.
//!
//! The top-level entry points are [`parse_str`] and [`parse_file`].

use crate::command::AtCommand;
use crate::error::{AtError, Result};
use crate::esk::{Esk, ScheduledEsk};
use regex::Regex;
use std::path::Path;

/// The commands of a script and the ESKs scheduled between them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub commands: Vec<AtCommand>,
    pub esks: Vec<ScheduledEsk>,
}

/// One parsed, non-comment line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Command(AtCommand),
    Esk(Esk),
}

/// Parse a script from a string slice.
///
/// Lines that are blank or start with `#` are ignored. A line whose first
/// word is a keyword is an ESK; anything else is a command of the form
/// `CMD;;EXPECTED;;DELAY_MS;;TIMEOUT_S;;COLLECTABLES;;DGANGER;;DGANGER_EXPECTED`
/// where every field after the first is optional.
///
/// Each ESK is scheduled before the command that follows it, i.e. at the
/// number of commands parsed so far.
///
/// # Errors
///
/// Returns [`AtError::Syntax`] for the first malformed line, citing its
/// 1-based number and text.
///
/// # Example
///
/// ```
/// use atscript::parse_str;
///
/// let script = parse_str("BAUDRATE 115200\nAT;;OK\nAT+CSQ;;OK").unwrap();
/// assert_eq!(script.commands.len(), 2);
/// assert_eq!(script.esks[0].index, 0);
/// ```
pub fn parse_str(content: &str) -> Result<Script> {
    let mut script = Script::default();
    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line).map_err(|reason| AtError::syntax(line_num + 1, reason, line))? {
            Line::Esk(esk) => script.esks.push(ScheduledEsk {
                esk,
                index: script.commands.len(),
            }),
            Line::Command(cmd) => script.commands.push(cmd),
        }
    }
    Ok(script)
}

/// Parse a script file.
///
/// # Errors
///
/// Returns [`AtError::ScriptNotFound`] if the file cannot be read, and the
/// errors of [`parse_str`] otherwise.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Script> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| AtError::ScriptNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&content)
}

/// Classify and parse a single non-empty, non-comment line.
pub fn parse_line(line: &str) -> std::result::Result<Line, String> {
    let trimmed = line.trim();
    let (word, attr) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, None), |(word, rest)| (word, Some(rest)));
    if Esk::is_keyword(word) {
        return Esk::parse(word, attr).map(Line::Esk);
    }
    parse_command(line).map(Line::Command)
}

fn parse_command(line: &str) -> std::result::Result<AtCommand, String> {
    let fields: Vec<&str> = line.split(";;").collect();
    let field = |i: usize| fields.get(i).copied().filter(|f| !f.is_empty());

    let command = fields[0];
    if command.trim().is_empty() {
        return Err("Missing command".into());
    }
    let expected = field(1);
    let delay = field(2)
        .map(|d| d.trim().parse::<i64>())
        .transpose()
        .map_err(|_| "Delay is not a number".to_string())?;
    let timeout = field(3)
        .map(|t| t.trim().parse::<i64>())
        .transpose()
        .map_err(|_| "Timeout is not a number".to_string())?;
    let collectables = field(4).map(parse_collectables).transpose()?;
    let dganger_expected = field(6);

    for pattern in [expected, dganger_expected].into_iter().flatten() {
        Regex::new(pattern).map_err(|e| format!("Invalid expected response '{pattern}': {e}"))?;
    }

    let build = |text: &str, expected: Option<&str>| {
        let mut cmd = AtCommand::new(text, expected)
            .with_delay(delay.unwrap_or(0))
            .with_collectables(collectables.clone());
        if let Some(seconds) = timeout {
            cmd.set_timeout(seconds);
        }
        cmd
    };

    let mut cmd = build(command, expected);
    if let Some(dganger) = field(5) {
        cmd = cmd.with_doppelganger(build(dganger, dganger_expected));
    }
    Ok(cmd)
}

/// Parse a collectables field: a bracketed, comma-separated list of single-
/// or double-quoted strings, with an optional trailing comma.
///
/// Recognised escapes are `\\`, `\"`, `\'`, `\n` and `\t`; any other escape
/// is kept as written.
pub fn parse_collectables(field: &str) -> std::result::Result<Vec<String>, String> {
    const INVALID: &str = "Collectables has invalid syntax";
    let inner = field
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("{INVALID}: expected a [..] list"))?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '"' && quote != '\'' {
            return Err(format!("{INVALID}: expected a quoted string"));
        }

        let mut item = String::new();
        let mut closed = false;
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some('\\') => item.push('\\'),
                    Some('"') => item.push('"'),
                    Some('\'') => item.push('\''),
                    Some('n') => item.push('\n'),
                    Some('t') => item.push('\t'),
                    Some(other) => {
                        item.push('\\');
                        item.push(other);
                    }
                    None => break,
                },
                c if c == quote => {
                    closed = true;
                    break;
                }
                c => item.push(c),
            }
        }
        if !closed {
            return Err(format!("{INVALID}: unterminated string"));
        }
        items.push(item);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => {}
            Some(_) => return Err(format!("{INVALID}: expected ','")),
        }
    }
    Ok(items)
}
