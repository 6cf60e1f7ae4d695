//! JSON Lines request replay.
//!
//! Each input line is one [`ApiRequest`], optionally tagged with
//! `"capture": "<name>"`. The response body of a tagged request is remembered,
//! and later lines may refer to it with `{{name.field.sub}}` placeholders in
//! any string value. A string that consists of a single placeholder is
//! replaced by the captured JSON value itself, so ids and numbers keep their
//! type.

use crate::error::{MarketError, Result};
use crate::interfaces::api::{ApiRequest, ApiResponse};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, Write};

/// One line of a replay script.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReplayStep {
    #[serde(flatten)]
    pub request: ApiRequest,
    #[serde(default)]
    pub capture: Option<String>,
}

/// Reads request lines lazily. Blank lines and lines starting with `#` are
/// skipped.
pub struct RequestReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Raw JSON values, one per non-blank line. Placeholders are resolved by
    /// [`Captures::resolve`] once earlier responses are known.
    pub fn lines(self) -> impl Iterator<Item = Result<Value>> {
        self.source.lines().filter_map(|line| match line {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    None
                } else {
                    Some(serde_json::from_str(line).map_err(MarketError::from))
                }
            }
            Err(e) => Some(Err(MarketError::from(e))),
        })
    }
}

/// Response bodies remembered by name.
#[derive(Debug, Default)]
pub struct Captures {
    values: HashMap<String, Value>,
}

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, response: &ApiResponse) {
        self.values.insert(name.to_string(), response.body.clone());
    }

    /// Substitutes placeholders in `raw` and parses it into a step.
    pub fn resolve(&self, raw: Value) -> Result<ReplayStep> {
        let resolved = self.substitute(raw)?;
        Ok(serde_json::from_value(resolved)?)
    }

    fn substitute(&self, value: Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => self.substitute_str(&s)?,
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| self.substitute(v))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, self.substitute(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other,
        })
    }

    fn substitute_str(&self, s: &str) -> Result<Value> {
        if let Some(inner) = s.strip_prefix("{{").and_then(|r| r.strip_suffix("}}"))
            && !inner.contains("{{")
        {
            return self.lookup(inner.trim()).cloned();
        }

        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start..].find("}}") else {
                break;
            };
            out.push_str(&rest[..start]);
            let path = rest[start + 2..start + len].trim();
            match self.lookup(path)? {
                Value::String(text) => out.push_str(text),
                other => out.push_str(&other.to_string()),
            }
            rest = &rest[start + len + 2..];
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }

    fn lookup(&self, path: &str) -> Result<&Value> {
        let mut parts = path.split('.');
        let name = parts.next().unwrap_or_default();
        let mut value = self.values.get(name).ok_or_else(|| {
            MarketError::ValidationError(format!("unknown capture '{name}'"))
        })?;
        for part in parts {
            let next = match value {
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                other => other.get(part),
            };
            value = next.ok_or_else(|| {
                MarketError::ValidationError(format!("capture path '{path}' not found"))
            })?;
        }
        Ok(value)
    }
}

/// Writes one JSON response per line.
pub struct ResponseWriter<W: Write> {
    sink: W,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn write(&mut self, response: &ApiResponse) -> Result<()> {
        serde_json::to_writer(&mut self.sink, response)?;
        self.sink.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}
