//! Settings export and import
//!
//! The export file is `{ version, exportedAt, userRules, domainRules }`.
//! Import accepts any JSON object; `userRules` and `domainRules` are taken if
//! present and everything else is ignored.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ps_core::config::CONFIG_VERSION;
use ps_core::types::{DomainRules, UserRules};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: String,
    /// ISO-8601 UTC timestamp with milliseconds.
    pub exported_at: String,
    pub user_rules: UserRules,
    pub domain_rules: DomainRules,
}

pub fn create_export(user_rules: &UserRules, domain_rules: &DomainRules, now: DateTime<Utc>) -> ExportData {
    ExportData {
        version: CONFIG_VERSION.to_string(),
        exported_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        user_rules: user_rules.clone(),
        domain_rules: domain_rules.clone(),
    }
}

/// `privacy-guard-settings-YYYY-MM-DD.json`, dated in UTC.
pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("privacy-guard-settings-{}.json", now.format("%Y-%m-%d"))
}

impl ExportData {
    /// Two-space indented JSON, as written to disk.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Error type for settings files that cannot be imported.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("File is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("File must contain a JSON object")]
    NotObject,
    #[error("Field `{field}` is malformed: {source}")]
    Malformed {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ImportError {
    /// True for files that are not settings files at all, as opposed to
    /// settings files with a bad field.
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, Self::NotJson(_) | Self::NotObject)
    }
}

/// The parts of an imported file that will be applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportData {
    pub user_rules: Option<UserRules>,
    pub domain_rules: Option<DomainRules>,
}

impl ImportData {
    pub fn is_empty(&self) -> bool {
        self.user_rules.is_none() && self.domain_rules.is_none()
    }
}

/// Parse and check a settings file. Nothing is applied unless every present
/// field decodes.
pub fn parse_import(text: &str) -> Result<ImportData, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut object) = value else {
        return Err(ImportError::NotObject);
    };
    Ok(ImportData {
        user_rules: take_field(&mut object, "userRules")?,
        domain_rules: take_field(&mut object, "domainRules")?,
    })
}

fn take_field<T: serde::de::DeserializeOwned>(
    object: &mut serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<Option<T>, ImportError> {
    match object.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| ImportError::Malformed { field, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ps_core::config::builtin_domains;
    use ps_core::types::RuleEntry;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 8, 30, 5).unwrap()
    }

    #[test]
    fn test_export_shape() {
        let rules = UserRules {
            keywords: vec![RuleEntry::new("ships to")],
            patterns: vec![],
        };
        let data = create_export(&rules, &builtin_domains(), at());
        let json: Value = serde_json::from_str(&data.to_pretty_json().unwrap()).unwrap();
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["exportedAt"], "2026-03-09T08:30:05.000Z");
        assert_eq!(json["userRules"]["keywords"][0]["value"], "ships to");
        assert_eq!(json["domainRules"]["amazon"]["name"], "Amazon.co.jp");
        assert_eq!(export_filename(at()), "privacy-guard-settings-2026-03-09.json");
    }

    #[test]
    fn test_export_roundtrips_through_import() {
        let data = create_export(&UserRules::default(), &builtin_domains(), at());
        let parsed = parse_import(&data.to_pretty_json().unwrap()).unwrap();
        assert_eq!(parsed.user_rules, Some(UserRules::default()));
        assert_eq!(parsed.domain_rules, Some(builtin_domains()));
    }

    #[test]
    fn test_import_rejects_non_objects() {
        assert!(matches!(parse_import("not json"), Err(ImportError::NotJson(_))));
        assert!(matches!(parse_import("[1, 2]"), Err(ImportError::NotObject)));
        assert!(matches!(parse_import("null"), Err(ImportError::NotObject)));
        assert!(parse_import("[]").unwrap_err().is_invalid_format());
    }

    #[test]
    fn test_import_partial_and_malformed() {
        let data = parse_import(r#"{"userRules": {"keywords": ["a"]}, "extra": 1}"#).unwrap();
        assert!(data.user_rules.is_some());
        assert!(data.domain_rules.is_none());

        assert!(parse_import("{}").unwrap().is_empty());

        let err = parse_import(r#"{"userRules": {"keywords": []}, "domainRules": 5}"#).unwrap_err();
        assert!(matches!(err, ImportError::Malformed { field: "domainRules", .. }));
        assert!(!err.is_invalid_format());
    }
}
