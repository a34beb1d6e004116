//! 预约类工具：预约、取消、改约
//!
//! 患者身份按部署配置只取一个来源（见 identity 模块）；session 模式下 schema 不暴露 patient_id。
//! 业务否定结果（号源不可用、没有找到预约）是正常返回值，不是错误。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::identity::IdentitySource;
use crate::store::{BookOutcome, CancelOutcome, RescheduleOutcome};
use crate::tools::clinic::{parse_args, ClinicContext};
use crate::tools::schema::{args_schema, without_property};
use crate::tools::validate::{display_doctor, validate_datetime};
use crate::tools::{Tool, ToolContext};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AppointmentArgs {
    /// 医生姓名（名单内）
    pub doctor_name: String,
    /// 预约时间，格式 DD-MM-YYYY HH:MM
    pub appointment_datetime: String,
    /// 患者 ID（7–8 位数字）
    #[schemars(with = "Option<u64>")]
    #[serde(default)]
    pub patient_id: Option<Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RescheduleArgs {
    /// 医生姓名（名单内）
    pub doctor_name: String,
    /// 原预约时间，格式 DD-MM-YYYY HH:MM
    pub old_appointment_datetime: String,
    /// 新预约时间，格式 DD-MM-YYYY HH:MM
    pub new_appointment_datetime: String,
    /// 患者 ID（7–8 位数字）
    #[schemars(with = "Option<u64>")]
    #[serde(default)]
    pub patient_id: Option<Value>,
}

fn schema_for_identity<T: JsonSchema>(identity: IdentitySource) -> Value {
    let schema = args_schema::<T>();
    match identity {
        IdentitySource::Session => without_property(schema, "patient_id"),
        IdentitySource::Arguments => {
            let mut schema = schema;
            if let Some(required) = schema.get_mut("required").and_then(Value::as_array_mut) {
                required.push(Value::String("patient_id".into()));
            }
            schema
        }
    }
}

pub struct BookAppointmentTool {
    clinic: Arc<ClinicContext>,
}

impl BookAppointmentTool {
    pub fn new(clinic: Arc<ClinicContext>) -> Self {
        Self { clinic }
    }
}

#[async_trait]
impl Tool for BookAppointmentTool {
    fn name(&self) -> &str {
        "book_appointment"
    }

    fn description(&self) -> &str {
        "Book the exact slot of a doctor at DD-MM-YYYY HH:MM for the patient."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_identity::<AppointmentArgs>(self.clinic.identity)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let args: AppointmentArgs = parse_args(args).map_err(|e| e.to_string())?;
        let doctor = self.clinic.roster.doctor(&args.doctor_name).map_err(|e| e.to_string())?;
        let slot = validate_datetime(&args.appointment_datetime).map_err(|e| e.to_string())?;
        let patient = self
            .clinic
            .resolve_patient(args.patient_id.as_ref(), ctx)
            .map_err(|e| e.to_string())?;

        let outcome = self
            .clinic
            .store
            .book(&doctor.name, &slot, patient)
            .await
            .map_err(|e| format!("Could not book the appointment: {e}"))?;
        let display = display_doctor(&doctor.name);
        match outcome {
            BookOutcome::Booked => {
                let text = format!(
                    "Appointment successfully booked with Dr. {display} on {slot} for patient ID {patient}."
                );
                self.clinic.notify(patient, "Appointment confirmed", &text);
                Ok(text)
            }
            BookOutcome::Unavailable => Ok(format!(
                "Sorry, Dr. {display} is not available on {slot}. Please choose a different time."
            )),
        }
    }
}

pub struct CancelAppointmentTool {
    clinic: Arc<ClinicContext>,
}

impl CancelAppointmentTool {
    pub fn new(clinic: Arc<ClinicContext>) -> Self {
        Self { clinic }
    }
}

#[async_trait]
impl Tool for CancelAppointmentTool {
    fn name(&self) -> &str {
        "cancel_appointment"
    }

    fn description(&self) -> &str {
        "Cancel the patient's existing appointment with a doctor at DD-MM-YYYY HH:MM."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_identity::<AppointmentArgs>(self.clinic.identity)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let args: AppointmentArgs = parse_args(args).map_err(|e| e.to_string())?;
        let doctor = self.clinic.roster.doctor(&args.doctor_name).map_err(|e| e.to_string())?;
        let slot = validate_datetime(&args.appointment_datetime).map_err(|e| e.to_string())?;
        let patient = self
            .clinic
            .resolve_patient(args.patient_id.as_ref(), ctx)
            .map_err(|e| e.to_string())?;

        let outcome = self
            .clinic
            .store
            .cancel(&doctor.name, &slot, patient)
            .await
            .map_err(|e| format!("Could not cancel the appointment: {e}"))?;
        let display = display_doctor(&doctor.name);
        match outcome {
            CancelOutcome::Cancelled => {
                let text = format!(
                    "Appointment with Dr. {display} on {slot} for patient ID {patient} has been successfully canceled."
                );
                self.clinic.notify(patient, "Appointment canceled", &text);
                Ok(text)
            }
            CancelOutcome::NotFound => Ok(format!(
                "No existing appointment found with Dr. {display} on {slot} for patient ID {patient}."
            )),
        }
    }
}

pub struct RescheduleAppointmentTool {
    clinic: Arc<ClinicContext>,
}

impl RescheduleAppointmentTool {
    pub fn new(clinic: Arc<ClinicContext>) -> Self {
        Self { clinic }
    }
}

#[async_trait]
impl Tool for RescheduleAppointmentTool {
    fn name(&self) -> &str {
        "reschedule_appointment"
    }

    fn description(&self) -> &str {
        "Move the patient's appointment with a doctor from one DD-MM-YYYY HH:MM slot to another free slot of the same doctor."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_identity::<RescheduleArgs>(self.clinic.identity)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let args: RescheduleArgs = parse_args(args).map_err(|e| e.to_string())?;
        let doctor = self.clinic.roster.doctor(&args.doctor_name).map_err(|e| e.to_string())?;
        let old_slot = validate_datetime(&args.old_appointment_datetime).map_err(|e| e.to_string())?;
        let new_slot = validate_datetime(&args.new_appointment_datetime).map_err(|e| e.to_string())?;
        let patient = self
            .clinic
            .resolve_patient(args.patient_id.as_ref(), ctx)
            .map_err(|e| e.to_string())?;

        let outcome = self
            .clinic
            .store
            .reschedule(&doctor.name, &old_slot, &new_slot, patient)
            .await
            .map_err(|e| format!("Could not reschedule the appointment: {e}"))?;
        let display = display_doctor(&doctor.name);
        match outcome {
            RescheduleOutcome::Rescheduled => {
                let text = format!(
                    "Appointment with Dr. {display} has been successfully rescheduled from {old_slot} to {new_slot} for patient ID {patient}."
                );
                self.clinic.notify(patient, "Appointment rescheduled", &text);
                Ok(text)
            }
            RescheduleOutcome::OldSlotNotHeld => Ok(format!(
                "No existing appointment found with Dr. {display} on {old_slot} for patient ID {patient}."
            )),
            RescheduleOutcome::NewSlotUnavailable => Ok(format!(
                "Sorry, Dr. {display} is not available on {new_slot}. Please choose a different time."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Database, PatientId, SlotRecord, SlotStore};
    use crate::tools::validate::{DoctorEntry, Roster};

    async fn clinic(identity: IdentitySource) -> Arc<ClinicContext> {
        let store = SlotStore::new(Database::open_in_memory().unwrap());
        store
            .seed(vec![
                SlotRecord::free("sharma", "cardiologist", "16-06-2025 10:00"),
                SlotRecord::free("sharma", "cardiologist", "16-06-2025 11:00"),
            ])
            .await
            .unwrap();
        let roster = Roster::new(vec![DoctorEntry {
            name: "sharma".into(),
            specialization: "cardiologist".into(),
        }]);
        Arc::new(ClinicContext::new(store, roster, identity))
    }

    fn session() -> ToolContext {
        ToolContext::for_patient(PatientId::new(1234567))
    }

    #[tokio::test]
    async fn test_book_twice() {
        let clinic = clinic(IdentitySource::Session).await;
        let tool = BookAppointmentTool::new(clinic.clone());
        let args = serde_json::json!({"doctor_name": "Sharma", "appointment_datetime": "16-06-2025 10:00"});
        let first = tool.execute(args.clone(), &session()).await.unwrap();
        assert_eq!(
            first,
            "Appointment successfully booked with Dr. Sharma on 16-06-2025 10:00 for patient ID 1234567."
        );
        let row = clinic.store.get("sharma", "16-06-2025 10:00").await.unwrap().unwrap();
        assert!(!row.is_available);
        assert_eq!(row.patient_to_attend, PatientId::new(1234567));

        let second = tool.execute(args, &session()).await.unwrap();
        assert!(second.starts_with("Sorry, Dr. Sharma is not available on 16-06-2025 10:00"));
    }

    #[tokio::test]
    async fn test_session_mode_rejects_patient_argument() {
        let clinic = clinic(IdentitySource::Session).await;
        let tool = BookAppointmentTool::new(clinic.clone());
        assert!(tool.parameters_schema()["properties"].get("patient_id").is_none());
        let err = tool
            .execute(
                serde_json::json!({
                    "doctor_name": "sharma",
                    "appointment_datetime": "16-06-2025 10:00",
                    "patient_id": 7654321
                }),
                &session(),
            )
            .await
            .unwrap_err();
        assert!(err.contains("patient_id"));
        assert!(clinic.store.get("sharma", "16-06-2025 10:00").await.unwrap().unwrap().is_available);
    }

    #[tokio::test]
    async fn test_arguments_mode_validates_patient_id() {
        let clinic = clinic(IdentitySource::Arguments).await;
        let tool = BookAppointmentTool::new(clinic);
        let required = tool.parameters_schema()["required"].clone();
        assert!(required.as_array().unwrap().iter().any(|v| v == "patient_id"));
        let err = tool
            .execute(
                serde_json::json!({
                    "doctor_name": "sharma",
                    "appointment_datetime": "16-06-2025 10:00",
                    "patient_id": 12
                }),
                &ToolContext::default(),
            )
            .await
            .unwrap_err();
        assert!(err.contains("7 or 8-digit"));
        let ok = tool
            .execute(
                serde_json::json!({
                    "doctor_name": "sharma",
                    "appointment_datetime": "16-06-2025 10:00",
                    "patient_id": "1234567"
                }),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(ok.contains("successfully booked"));
    }

    #[tokio::test]
    async fn test_cancel_not_owned_leaves_store_unchanged() {
        let clinic = clinic(IdentitySource::Session).await;
        clinic
            .store
            .book("sharma", "16-06-2025 10:00", PatientId::new(7654321).unwrap())
            .await
            .unwrap();
        let tool = CancelAppointmentTool::new(clinic.clone());
        let out = tool
            .execute(
                serde_json::json!({"doctor_name": "sharma", "appointment_datetime": "16-06-2025 10:00"}),
                &session(),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            "No existing appointment found with Dr. Sharma on 16-06-2025 10:00 for patient ID 1234567."
        );
        let row = clinic.store.get("sharma", "16-06-2025 10:00").await.unwrap().unwrap();
        assert_eq!(row.patient_to_attend, PatientId::new(7654321));
    }

    #[tokio::test]
    async fn test_reschedule_reports_failed_precondition() {
        let clinic = clinic(IdentitySource::Session).await;
        let tool = RescheduleAppointmentTool::new(clinic.clone());
        let args = serde_json::json!({
            "doctor_name": "sharma",
            "old_appointment_datetime": "16-06-2025 10:00",
            "new_appointment_datetime": "16-06-2025 11:00"
        });
        let out = tool.execute(args.clone(), &session()).await.unwrap();
        assert!(out.starts_with("No existing appointment found"));

        clinic
            .store
            .book("sharma", "16-06-2025 10:00", PatientId::new(1234567).unwrap())
            .await
            .unwrap();
        let out = tool.execute(args, &session()).await.unwrap();
        assert!(out.contains("successfully rescheduled from 16-06-2025 10:00 to 16-06-2025 11:00"));
    }

    #[tokio::test]
    async fn test_bad_datetime_rejected() {
        let tool = CancelAppointmentTool::new(clinic(IdentitySource::Session).await);
        let err = tool
            .execute(
                serde_json::json!({"doctor_name": "sharma", "appointment_datetime": "16-06-2025"}),
                &session(),
            )
            .await
            .unwrap_err();
        assert!(err.contains("DD-MM-YYYY HH:MM"));
    }
}
