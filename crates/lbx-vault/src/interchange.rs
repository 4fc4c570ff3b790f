//! Plaintext interchange formats for export/import.
//!
//! This is the one place plaintext deliberately leaves the encryption
//! boundary; outputs are wrapped in [`Zeroizing`] so at least our copy is wiped.

use chrono::{DateTime, Utc};
use lbx_core::{LockboxError, LockboxResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::record::SecretRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full dump: key → record (value, description, version, timestamps)
    Json,
    /// `KEY=value` lines
    Env,
}

impl FromStr for ExportFormat {
    type Err = LockboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "env" | "dotenv" => Ok(Self::Env),
            other => Err(LockboxError::Format(format!("unknown export format: {other}"))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Env => write!(f, "env"),
        }
    }
}

/// One parsed entry from an import payload.
#[derive(Clone)]
pub struct ImportEntry {
    pub key: String,
    pub value: Zeroizing<String>,
    pub description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportRecord<'a> {
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonImportValue {
    Plain(String),
    Record {
        value: String,
        #[serde(default)]
        description: Option<String>,
    },
}

pub fn export(
    secrets: &BTreeMap<String, SecretRecord>,
    format: ExportFormat,
) -> LockboxResult<Zeroizing<String>> {
    match format {
        ExportFormat::Json => {
            let records: BTreeMap<&str, ExportRecord<'_>> = secrets
                .iter()
                .map(|(k, r)| {
                    (
                        k.as_str(),
                        ExportRecord {
                            value: &r.value,
                            description: r.description.as_deref(),
                            version: r.version,
                            created_at: r.created_at,
                            updated_at: r.updated_at,
                        },
                    )
                })
                .collect();
            Ok(Zeroizing::new(serde_json::to_string_pretty(&records)?))
        }
        ExportFormat::Env => {
            let mut out = Zeroizing::new(String::new());
            for (key, record) in secrets {
                out.push_str(key);
                out.push('=');
                push_env_value(&mut out, &record.value);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

pub fn parse(data: &str, format: ExportFormat) -> LockboxResult<Vec<ImportEntry>> {
    match format {
        ExportFormat::Json => parse_json(data),
        ExportFormat::Env => parse_env(data),
    }
}

fn parse_json(data: &str) -> LockboxResult<Vec<ImportEntry>> {
    let map: BTreeMap<String, JsonImportValue> = serde_json::from_str(data)
        .map_err(|e| LockboxError::Format(format!("invalid JSON import: {e}")))?;

    Ok(map
        .into_iter()
        .map(|(key, v)| match v {
            JsonImportValue::Plain(value) => ImportEntry {
                key,
                value: Zeroizing::new(value),
                description: None,
            },
            JsonImportValue::Record { value, description } => ImportEntry {
                key,
                value: Zeroizing::new(value),
                description,
            },
        })
        .collect())
}

fn parse_env(data: &str) -> LockboxResult<Vec<ImportEntry>> {
    let mut entries = Vec::new();

    for (lineno, raw) in data.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, value) = line.split_once('=').ok_or_else(|| {
            LockboxError::Format(format!("line {}: expected KEY=value", lineno + 1))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(LockboxError::Format(format!("line {}: empty key", lineno + 1)));
        }

        entries.push(ImportEntry {
            key: key.to_string(),
            value: Zeroizing::new(unquote_env_value(value.trim())),
            description: None,
        });
    }

    Ok(entries)
}

fn needs_quoting(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\'))
}

fn push_env_value(out: &mut String, value: &str) {
    if !needs_quoting(value) {
        out.push_str(value);
        return;
    }
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
}

fn unquote_env_value(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    if !(value.len() >= 2 && value.starts_with('"') && value.ends_with('"')) {
        return value.to_string();
    }

    let inner = &value[1..value.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
