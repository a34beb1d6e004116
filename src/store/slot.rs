//! 号源记录与患者 ID

use std::fmt;

use serde::{Deserialize, Serialize};

/// 患者 ID：7 或 8 位十进制数
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct PatientId(i64);

impl PatientId {
    pub const MIN: i64 = 1_000_000;
    pub const MAX: i64 = 99_999_999;

    /// 位数不合法时返回 None
    pub fn new(raw: i64) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&raw).then_some(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for PatientId {
    type Error = String;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| format!("The ID number should be a 7 or 8-digit number, got {raw}"))
    }
}

impl From<PatientId> for i64 {
    fn from(id: PatientId) -> Self {
        id.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 一行号源：(医生, 时间) 唯一；is_available 为 false 当且仅当 occupant 非空
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub doctor_name: String,
    pub specialization: String,
    /// `DD-MM-YYYY HH:MM`
    pub date_slot: String,
    pub is_available: bool,
    pub patient_to_attend: Option<PatientId>,
}

impl SlotRecord {
    /// 空闲号源
    pub fn free(
        doctor_name: impl Into<String>,
        specialization: impl Into<String>,
        date_slot: impl Into<String>,
    ) -> Self {
        Self {
            doctor_name: doctor_name.into(),
            specialization: specialization.into(),
            date_slot: date_slot.into(),
            is_available: true,
            patient_to_attend: None,
        }
    }

    /// 已被患者占用的号源
    pub fn booked(
        doctor_name: impl Into<String>,
        specialization: impl Into<String>,
        date_slot: impl Into<String>,
        patient: PatientId,
    ) -> Self {
        Self {
            is_available: false,
            patient_to_attend: Some(patient),
            ..Self::free(doctor_name, specialization, date_slot)
        }
    }

    /// 时间部分（HH:MM）
    pub fn time_of_day(&self) -> &str {
        time_part(&self.date_slot)
    }
}

/// `DD-MM-YYYY HH:MM` 的时间部分；格式不符时返回原串
pub fn time_part(date_slot: &str) -> &str {
    date_slot.rsplit(' ').next().unwrap_or(date_slot)
}

/// 24 小时制 `HH:MM` 转 12 小时制（`9:30 AM`）；无法解析时原样返回
pub fn to_am_pm(time: &str) -> String {
    let Some((h, m)) = time.split_once(':') else {
        return time.to_string();
    };
    let (Ok(hour), Ok(minute)) = (h.parse::<u32>(), m.parse::<u32>()) else {
        return time.to_string();
    };
    let period = if hour < 12 { "AM" } else { "PM" };
    let hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{hour}:{minute:02} {period}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_id_bounds() {
        assert!(PatientId::new(1234567).is_some());
        assert!(PatientId::new(12345678).is_some());
        assert!(PatientId::new(123456).is_none());
        assert!(PatientId::new(123456789).is_none());
        assert!(PatientId::new(-1234567).is_none());
    }

    #[test]
    fn test_patient_id_serde_validates() {
        let ok: PatientId = serde_json::from_str("1234567").unwrap();
        assert_eq!(ok.get(), 1234567);
        assert!(serde_json::from_str::<PatientId>("42").is_err());
    }

    #[test]
    fn test_to_am_pm() {
        assert_eq!(to_am_pm("00:30"), "12:30 AM");
        assert_eq!(to_am_pm("09:00"), "9:00 AM");
        assert_eq!(to_am_pm("12:00"), "12:00 PM");
        assert_eq!(to_am_pm("16:05"), "4:05 PM");
        assert_eq!(to_am_pm("noon"), "noon");
    }

    #[test]
    fn test_time_part() {
        let slot = SlotRecord::free("sharma", "cardiologist", "16-06-2025 10:00");
        assert_eq!(slot.time_of_day(), "10:00");
    }
}
