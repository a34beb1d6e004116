//! 工具参数校验
//!
//! 医生名与专科必须属于配置中的封闭名单；日期严格为 `DD-MM-YYYY`，时间为 `DD-MM-YYYY HH:MM`，
//! 且必须是真实存在的日历日期；患者 ID 为 7–8 位数字。校验失败发生在任何存储访问之前。

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::PatientId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown doctor '{0}'; known doctors: {1}")]
    UnknownDoctor(String, String),

    #[error("unknown specialization '{0}'; known specializations: {1}")]
    UnknownSpecialization(String, String),

    #[error("date must be in the format DD-MM-YYYY, got '{0}'")]
    BadDate(String),

    #[error("datetime must be in the format DD-MM-YYYY HH:MM, got '{0}'")]
    BadDateTime(String),

    #[error("The ID number should be a 7 or 8-digit number, got '{0}'")]
    BadPatientId(String),

    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),

    #[error("argument '{0}' is not accepted: {1}")]
    UnexpectedArgument(&'static str, &'static str),

    #[error("no authenticated patient for this conversation")]
    MissingIdentity,

    #[error("invalid arguments: {0}")]
    Malformed(String),
}

/// 名单中的一位医生
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorEntry {
    pub name: String,
    pub specialization: String,
}

/// 封闭名单：医生与专科（专科集合由医生条目推出）
#[derive(Debug, Clone, Default)]
pub struct Roster {
    doctors: Vec<DoctorEntry>,
    specializations: Vec<String>,
}

fn normalize_doctor(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let stripped = lower
        .strip_prefix("dr.")
        .or_else(|| lower.strip_prefix("dr "))
        .unwrap_or(&lower);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_specialization(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

impl Roster {
    pub fn new(doctors: Vec<DoctorEntry>) -> Self {
        let doctors: Vec<DoctorEntry> = doctors
            .into_iter()
            .map(|d| DoctorEntry {
                name: normalize_doctor(&d.name),
                specialization: normalize_specialization(&d.specialization),
            })
            .collect();
        let mut specializations: Vec<String> =
            doctors.iter().map(|d| d.specialization.clone()).collect();
        specializations.sort();
        specializations.dedup();
        Self {
            doctors,
            specializations,
        }
    }

    pub fn doctors(&self) -> &[DoctorEntry] {
        &self.doctors
    }

    pub fn specializations(&self) -> &[String] {
        &self.specializations
    }

    /// 大小写不敏感、允许 "Dr." 前缀；返回名单中的规范条目
    pub fn doctor(&self, raw: &str) -> Result<&DoctorEntry, ValidationError> {
        let wanted = normalize_doctor(raw);
        self.doctors.iter().find(|d| d.name == wanted).ok_or_else(|| {
            let known: Vec<&str> = self.doctors.iter().map(|d| d.name.as_str()).collect();
            ValidationError::UnknownDoctor(raw.to_string(), known.join(", "))
        })
    }

    /// 空格 / 下划线 / 连字符等价；返回规范写法（下划线）
    pub fn specialization(&self, raw: &str) -> Result<&str, ValidationError> {
        let wanted = normalize_specialization(raw);
        self.specializations
            .iter()
            .find(|s| **s == wanted)
            .map(String::as_str)
            .ok_or_else(|| {
                ValidationError::UnknownSpecialization(raw.to_string(), self.specializations.join(", "))
            })
    }
}

/// 展示用医生名："kevin anderson" -> "Kevin Anderson"
pub fn display_doctor(name: &str) -> String {
    name.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn date_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").ok()).as_ref()
}

fn datetime_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-\d{2}-\d{4} \d{2}:\d{2}$").ok()).as_ref()
}

/// 校验 `DD-MM-YYYY`，返回去空白后的原串
pub fn validate_date(raw: &str) -> Result<String, ValidationError> {
    let s = raw.trim();
    let shape_ok = date_re().is_some_and(|re| re.is_match(s));
    if !shape_ok || NaiveDate::parse_from_str(s, "%d-%m-%Y").is_err() {
        return Err(ValidationError::BadDate(raw.to_string()));
    }
    Ok(s.to_string())
}

/// 校验 `DD-MM-YYYY HH:MM`
pub fn validate_datetime(raw: &str) -> Result<String, ValidationError> {
    let s = raw.trim();
    let shape_ok = datetime_re().is_some_and(|re| re.is_match(s));
    if !shape_ok || NaiveDateTime::parse_from_str(s, "%d-%m-%Y %H:%M").is_err() {
        return Err(ValidationError::BadDateTime(raw.to_string()));
    }
    Ok(s.to_string())
}

/// 患者 ID 可为 JSON 整数或数字字符串
pub fn validate_patient_id(raw: &Value) -> Result<PatientId, ValidationError> {
    let parsed = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) if s.trim().chars().all(|c| c.is_ascii_digit()) => s.trim().parse().ok(),
        _ => None,
    };
    parsed
        .and_then(PatientId::new)
        .ok_or_else(|| ValidationError::BadPatientId(raw.to_string()))
}
