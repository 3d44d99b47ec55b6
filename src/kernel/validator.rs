use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::record::ParameterValue;
use crate::error::ValidationError;

/// Column types a parameter may provision in the Notion database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotionType {
    RichText,
    Number,
    Select,
    MultiSelect,
    Files,
    Checkbox,
    Url,
    Email,
    PhoneNumber,
    People,
    Date,
}

impl NotionType {
    pub const ALL: [NotionType; 11] = [
        NotionType::RichText,
        NotionType::Number,
        NotionType::Select,
        NotionType::MultiSelect,
        NotionType::Files,
        NotionType::Checkbox,
        NotionType::Url,
        NotionType::Email,
        NotionType::PhoneNumber,
        NotionType::People,
        NotionType::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotionType::RichText => "rich_text",
            NotionType::Number => "number",
            NotionType::Select => "select",
            NotionType::MultiSelect => "multi_select",
            NotionType::Files => "files",
            NotionType::Checkbox => "checkbox",
            NotionType::Url => "url",
            NotionType::Email => "email",
            NotionType::PhoneNumber => "phone_number",
            NotionType::People => "people",
            NotionType::Date => "date",
        }
    }

    /// Checks that `value` has the shape Notion expects for this column type.
    pub fn validate(&self, value: &ParameterValue) -> Result<(), ValidationError> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(ValidationError::InvalidValue {
                kind: *self,
                value: value.to_string(),
            })
        }
    }

    fn accepts(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (NotionType::RichText, _) => true,

            (NotionType::Number, ParameterValue::Integer(_)) => true,
            (NotionType::Number, ParameterValue::Float(x)) => x.is_finite(),
            (NotionType::Number, ParameterValue::Text(s)) => is_decimal(s),
            (NotionType::Number, ParameterValue::Boolean(_)) => false,

            (NotionType::Checkbox, ParameterValue::Boolean(_)) => true,
            (NotionType::Checkbox, ParameterValue::Integer(i)) => *i == 0 || *i == 1,
            (NotionType::Checkbox, ParameterValue::Text(s)) => {
                let s = s.trim();
                s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")
            }
            (NotionType::Checkbox, ParameterValue::Float(_)) => false,

            // Everything else is judged on the text form.
            (kind, value) => {
                let text = value.to_string();
                match kind {
                    NotionType::Select => is_select_option(&text),
                    NotionType::MultiSelect => all_elements(&text, is_select_option),
                    NotionType::Files => all_elements(&text, is_url),
                    NotionType::Url => is_url(&text),
                    NotionType::Email => is_email(&text),
                    NotionType::PhoneNumber => is_phone_number(&text),
                    NotionType::People => all_elements(&text, is_person_id),
                    NotionType::Date => is_iso_date(&text),
                    _ => false,
                }
            }
        }
    }
}

impl fmt::Display for NotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotionType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownType(s.to_string()))
    }
}

fn is_decimal(s: &str) -> bool {
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    DECIMAL
        .get_or_init(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("static pattern compiles"))
        .is_match(s.trim())
}

fn is_select_option(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && !s.contains(',')
}

/// Comma-separated lists: every element must pass `rule` on its own.
fn all_elements(s: &str, rule: fn(&str) -> bool) -> bool {
    !s.trim().is_empty() && s.split(',').map(str::trim).all(rule)
}

fn is_url(s: &str) -> bool {
    Url::parse(s.trim())
        .map(|url| url.has_host())
        .unwrap_or(false)
}

fn is_email(s: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static pattern compiles"))
        .is_match(s.trim())
}

fn is_phone_number(s: &str) -> bool {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    let s = s.trim();
    PHONE
        .get_or_init(|| Regex::new(r"^\+?[0-9 ().\-]+$").expect("static pattern compiles"))
        .is_match(s)
        && s.chars().filter(char::is_ascii_digit).count() >= 3
}

// Notion user ids are UUIDs, with or without hyphens.
fn is_person_id(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

fn is_iso_date(s: &str) -> bool {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}
