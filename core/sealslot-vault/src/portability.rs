//! Import bundle parsing and classification.
//!
//! The guards run in a fixed order so the caller always gets the most
//! specific error: size before parse, shape before version, version before
//! full validation, validation before any key derivation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bundle::{is_master_protected, validate, Bundle, MAX_IMPORT_BYTES};
use crate::error::{Error, Result};

/// What kind of protection an imported bundle carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportOutcome {
    #[serde(rename = "masterPassword")]
    MasterPassword,
    #[serde(rename = "customExportPassword")]
    CustomExportPassword,
}

impl ImportOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportOutcome::MasterPassword => "masterPassword",
            ImportOutcome::CustomExportPassword => "customExportPassword",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ImportClass {
    Master,
    CustomExport,
}

/// Runs the structural import pipeline: size guard, JSON parse, shape and
/// version checks, full validation, and protection classification.
pub(crate) fn parse_and_classify(serialized: &str) -> Result<(Bundle, ImportClass)> {
    if serialized.len() > MAX_IMPORT_BYTES {
        return Err(Error::Import(format!(
            "bundle exceeds the {MAX_IMPORT_BYTES}-byte import limit"
        )));
    }

    let value: Value = serde_json::from_str(serialized)
        .map_err(|_| Error::Import("bundle is not valid JSON".into()))?;

    let header = value
        .get("header")
        .filter(|h| h.is_object())
        .ok_or_else(|| Error::Import("bundle is missing its header".into()))?;
    if !value.get("data").is_some_and(Value::is_object) {
        return Err(Error::Import("bundle is missing its data section".into()));
    }

    match header.get("v").and_then(Value::as_u64) {
        Some(2 | 3) => {}
        Some(v) => return Err(Error::Import(format!("unsupported bundle version {v}"))),
        None => return Err(Error::Import("bundle version missing".into())),
    }

    let bundle: Bundle = serde_json::from_value(value)
        .map_err(|e| Error::Import(format!("bundle is malformed: {e}")))?;
    validate(&bundle, false).map_err(Error::Import)?;

    let class = if is_master_protected(&bundle.header) {
        ImportClass::Master
    } else {
        ImportClass::CustomExport
    };
    Ok((bundle, class))
}

/// Checks the import password is present, with a class-specific message.
/// Trimming applies to the check only; the returned password is verbatim.
pub(crate) fn require_import_password<'a>(
    class: ImportClass,
    password: Option<&'a str>,
) -> Result<&'a str> {
    let pw = password.unwrap_or("");
    if pw.trim().is_empty() {
        return Err(Error::Import(match class {
            ImportClass::Master => "the master password is required to import this bundle".into(),
            ImportClass::CustomExport => {
                "the export password is required to import this bundle".into()
            }
        }));
    }
    Ok(pw)
}
