//! Simulation parameters (Section 6): a flat, typed key/value table
//! loaded from a tab- or comma-separated parameter file (`--param`),
//! overlaid on top of compiled defaults. Every parameter the pipeline
//! actually consumes is read out of this table at startup; a parameter
//! present in the file that nothing consumes is not an error (future
//! pipeline revisions may read it), but a parameter the file does not
//! mention and the pipeline has no compiled default for is fatal the
//! first time it's used.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// A single typed parameter value, as decoded from one field of a
/// parameter-file row.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            ParamValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|v| u32::try_from(v).ok())
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("could not read parameter file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown parameter {0:?}: not recognized by this build")]
    Unknown(String),
    #[error("parameter {0:?} has no value and no compiled default")]
    MissingDefault(String),
}

/// Parses a single field into its typed value: `true`/`false` (case
/// insensitive) to `Bool`; a base-prefixed or plain integer literal
/// (`0x`, `0o`, `0b`, or decimal, with an optional leading `-`) to
/// `Int`; anything that parses as a float to `Float`; otherwise `Str`.
fn parse_field(raw: &str) -> ParamValue {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return ParamValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return ParamValue::Bool(false);
    }
    let (neg, digits) = trimmed.strip_prefix('-').map_or((false, trimmed), |rest| (true, rest));
    let parsed_int = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse::<i64>().ok()
    } else {
        None
    };
    if let Some(v) = parsed_int {
        return ParamValue::Int(if neg { -v } else { v });
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        return ParamValue::Float(v);
    }
    ParamValue::Str(trimmed.to_string())
}

/// The parameter table: a flat map loaded from a file, overlaid on
/// compiled defaults supplied by the caller.
#[derive(Clone, Debug, Default)]
pub struct ParamTable {
    values: HashMap<String, ParamValue>,
}

impl ParamTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a tab- or comma-separated parameter file: one `name<sep>value`
    /// pair per non-empty, non-`#`-comment line. The separator is
    /// detected per line (a tab if present, otherwise the first comma).
    ///
    /// # Errors
    /// Returns [`ParamError::Io`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, ParamError> {
        let text = std::fs::read_to_string(path).map_err(|source| ParamError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut values = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = split_field(line) else {
                continue;
            };
            values.insert(name.trim().to_string(), parse_field(value));
        }
        Ok(Self { values })
    }

    /// Merges `default` in for any parameter not already present from
    /// the loaded file (file values always win).
    pub fn with_default(&mut self, name: &str, default: ParamValue) {
        self.values.entry(name.to_string()).or_insert(default);
    }

    /// Looks up a parameter, returning a typed error distinguishing
    /// "never heard of this name" from "no value available at all".
    ///
    /// # Errors
    /// Returns [`ParamError::MissingDefault`] if `name` was registered
    /// (via [`Self::with_default`] or a prior successful `get`) but has
    /// no value; callers that never call `with_default` for `name` and
    /// find nothing in the file get the same error, since an unset
    /// parameter and an unrecognized one are indistinguishable once the
    /// file is loaded — recognition happens at the call site.
    pub fn get(&self, name: &str) -> Result<&ParamValue, ParamError> {
        self.values.get(name).ok_or_else(|| ParamError::MissingDefault(name.to_string()))
    }

    #[must_use]
    pub fn get_or(&self, name: &str, default: ParamValue) -> ParamValue {
        self.values.get(name).cloned().unwrap_or(default)
    }

    /// Validates that every key in the loaded file is one of `known`;
    /// an unrecognized parameter name is fatal per Section 6 ("unknown
    /// parameters fatal").
    ///
    /// # Errors
    /// Returns the first [`ParamError::Unknown`] name not in `known`.
    pub fn check_known(&self, known: &[&str]) -> Result<(), ParamError> {
        for name in self.values.keys() {
            if !known.contains(&name.as_str()) {
                return Err(ParamError::Unknown(name.clone()));
            }
        }
        Ok(())
    }
}

fn split_field(line: &str) -> Option<(&str, &str)> {
    if let Some(idx) = line.find('\t') {
        return Some((&line[..idx], &line[idx + 1..]));
    }
    line.find(',').map(|idx| (&line[..idx], &line[idx + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bool_int_float_and_string_fields() {
        assert_eq!(parse_field("true"), ParamValue::Bool(true));
        assert_eq!(parse_field("0x1F"), ParamValue::Int(31));
        assert_eq!(parse_field("-42"), ParamValue::Int(-42));
        assert_eq!(parse_field("3.5"), ParamValue::Float(3.5));
        assert_eq!(parse_field("CG1GPU"), ParamValue::Str("CG1GPU".to_string()));
    }

    #[test]
    fn load_parses_tab_and_comma_separated_lines() {
        let dir = std::env::temp_dir().join(format!("gs-twin-params-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("params.csv");
        std::fs::write(&path, "memSize\t65536\nfetchRate,2\n# comment\nfmt2GPU\ttrue\n").unwrap();
        let table = ParamTable::load(&path).unwrap();
        assert_eq!(table.get("memSize").unwrap().as_u32(), Some(65536));
        assert_eq!(table.get("fetchRate").unwrap().as_i64(), Some(2));
        assert_eq!(table.get("fmt2GPU").unwrap().as_bool(), Some(true));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut table = ParamTable::new();
        table.values.insert("bogusParam".to_string(), ParamValue::Int(1));
        assert!(matches!(table.check_known(&["memSize"]), Err(ParamError::Unknown(_))));
    }

    #[test]
    fn missing_parameter_falls_back_to_default() {
        let table = ParamTable::new();
        assert_eq!(table.get_or("memSize", ParamValue::Int(4096)).as_i64(), Some(4096));
    }
}
