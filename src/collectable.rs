//! Extraction of named values from a response.
//!
//! A collectable specifier is literal response text with one marker in it:
//! `?{name}` captures whatever sits between the literal fragments, and
//! `?{name::regex}` additionally requires the matching line to satisfy
//! `regex`. Literal fragments may reference session variables as `${name}`,
//! so one collectable can be anchored on a value collected earlier:
//!
//! ```text
//! AT+CSQ=?{rssi::[0-9]{1,2}},
//! AT+CSQ=${rssi},?{ber::[0-9]{1,2}}
//! ```

use crate::value::Value;
use regex::Regex;
use tracing::{debug, warn};

/// A collectable specifier split around its marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collectable<'a> {
    pub name: &'a str,
    pub key_regex: Option<&'a str>,
    pub prefix: &'a str,
    pub suffix: &'a str,
}

impl<'a> Collectable<'a> {
    /// Split `spec` around its `?{...}` marker. Braces inside the key regex
    /// are balanced, so quantifiers like `{1,2}` stay part of the regex.
    pub fn parse(spec: &'a str) -> Option<Self> {
        let start = spec.find("?{")?;
        let body_start = start + 2;
        let mut depth = 1usize;
        let mut end = None;
        for (i, ch) in spec[body_start..].char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(body_start + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end?;
        let inner = &spec[body_start..end];
        let (name, key_regex) = match inner.split_once("::") {
            Some((name, regex)) => (name, Some(regex)),
            None => (inner, None),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            key_regex,
            prefix: &spec[..start],
            suffix: &spec[end + 1..],
        })
    }

    /// Search `lines` for this collectable; the first line that matches wins.
    ///
    /// `substitute` resolves `${name}` references in the literal fragments.
    /// The captured text is the whole match with the literal fragments
    /// removed, coerced to an integer when it parses as one. An empty capture
    /// counts as no match.
    pub fn extract<F>(&self, lines: &[String], substitute: F) -> Option<Value>
    where
        F: Fn(&str) -> String,
    {
        let fragments: Vec<String> = [self.prefix, self.suffix]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(substitute)
            .collect();
        let prefix = if self.prefix.is_empty() {
            String::new()
        } else {
            regex::escape(&fragments[0])
        };
        let suffix = if self.suffix.is_empty() {
            String::new()
        } else {
            regex::escape(fragments.last()?)
        };
        let pattern = match Regex::new(&format!("{prefix}(.*){suffix}")) {
            Ok(re) => re,
            Err(e) => {
                warn!("Invalid collectable pattern for '{}': {}", self.name, e);
                return None;
            }
        };
        let key_regex = match self.key_regex.map(Regex::new).transpose() {
            Ok(re) => re,
            Err(e) => {
                warn!("Invalid key regex for collectable '{}': {}", self.name, e);
                return None;
            }
        };

        for line in lines {
            let Some(found) = pattern.find(line) else {
                continue;
            };
            if key_regex.as_ref().is_some_and(|re| !re.is_match(line)) {
                continue;
            }
            let mut captured = found.as_str().to_string();
            for fragment in &fragments {
                captured = captured.replace(fragment.as_str(), "");
            }
            if captured.is_empty() {
                return None;
            }
            debug!("Collected {} = {} from '{}'", self.name, captured, line);
            return Some(Value::coerce(&captured));
        }
        None
    }
}
