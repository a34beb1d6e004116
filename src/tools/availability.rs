//! 信息类工具：号源与名单查询（只读）

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::store::to_am_pm;
use crate::tools::clinic::{parse_args, ClinicContext};
use crate::tools::schema::args_schema;
use crate::tools::validate::{display_doctor, validate_date};
use crate::tools::{Tool, ToolContext};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DoctorDateArgs {
    /// 医生姓名（名单内，大小写不敏感，可带 "Dr." 前缀）
    pub doctor_name: String,
    /// 日期，格式 DD-MM-YYYY
    pub desired_date: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SpecializationDateArgs {
    /// 专科（名单内，如 general_dentist）
    pub specialization: String,
    /// 日期，格式 DD-MM-YYYY
    pub desired_date: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DateArgs {
    /// 日期，格式 DD-MM-YYYY
    pub desired_date: String,
}

pub struct CheckAvailabilityByDoctorTool {
    clinic: Arc<ClinicContext>,
    description: String,
}

impl CheckAvailabilityByDoctorTool {
    pub fn new(clinic: Arc<ClinicContext>) -> Self {
        let known: Vec<&str> = clinic.roster.doctors().iter().map(|d| d.name.as_str()).collect();
        let description = format!(
            "Check free time slots of one doctor on a date (DD-MM-YYYY). Known doctors: {}.",
            known.join(", ")
        );
        Self { clinic, description }
    }
}

#[async_trait]
impl Tool for CheckAvailabilityByDoctorTool {
    fn name(&self) -> &str {
        "check_availability_by_doctor"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DoctorDateArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String, String> {
        let args: DoctorDateArgs = parse_args(args).map_err(|e| e.to_string())?;
        let doctor = self.clinic.roster.doctor(&args.doctor_name).map_err(|e| e.to_string())?;
        let date = validate_date(&args.desired_date).map_err(|e| e.to_string())?;

        let times = self
            .clinic
            .store
            .free_times_for_doctor(&doctor.name, &date)
            .await
            .map_err(|e| format!("Could not read availability: {e}"))?;
        let display = display_doctor(&doctor.name);
        if times.is_empty() {
            Ok(format!(
                "No available slots for Dr. {display} on {date} in the entire day."
            ))
        } else {
            Ok(format!(
                "Available slots for Dr. {display} on {date} are: {}.",
                times.join(", ")
            ))
        }
    }
}

pub struct CheckAvailabilityBySpecializationTool {
    clinic: Arc<ClinicContext>,
    description: String,
}

impl CheckAvailabilityBySpecializationTool {
    pub fn new(clinic: Arc<ClinicContext>) -> Self {
        let description = format!(
            "Check free slots across all doctors of a specialization on a date (DD-MM-YYYY). Known specializations: {}.",
            clinic.roster.specializations().join(", ")
        );
        Self { clinic, description }
    }
}

#[async_trait]
impl Tool for CheckAvailabilityBySpecializationTool {
    fn name(&self) -> &str {
        "check_availability_by_specialization"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SpecializationDateArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String, String> {
        let args: SpecializationDateArgs = parse_args(args).map_err(|e| e.to_string())?;
        let specialization = self
            .clinic
            .roster
            .specialization(&args.specialization)
            .map_err(|e| e.to_string())?;
        let date = validate_date(&args.desired_date).map_err(|e| e.to_string())?;

        let slots = self
            .clinic
            .store
            .free_slots_for_specialization(specialization, &date)
            .await
            .map_err(|e| format!("Could not read availability: {e}"))?;
        let label = specialization.replace('_', " ");
        if slots.is_empty() {
            return Ok(format!(
                "No available slots for {label} on {date} in the entire day."
            ));
        }
        let lines: Vec<String> = slots
            .iter()
            .map(|(doctor, time)| format!("Dr. {} at {}", display_doctor(doctor), to_am_pm(time)))
            .collect();
        Ok(format!(
            "Available slots for {label} on {date} are:\n{}.",
            lines.join("\n")
        ))
    }
}

pub struct GetAvailableDoctorsTool {
    clinic: Arc<ClinicContext>,
}

impl GetAvailableDoctorsTool {
    pub fn new(clinic: Arc<ClinicContext>) -> Self {
        Self { clinic }
    }
}

#[async_trait]
impl Tool for GetAvailableDoctorsTool {
    fn name(&self) -> &str {
        "get_available_doctors"
    }

    fn description(&self) -> &str {
        "List every doctor that has at least one free slot. No arguments."
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
        let doctors = self
            .clinic
            .store
            .available_doctors(None)
            .await
            .map_err(|e| format!("Could not read availability: {e}"))?;
        if doctors.is_empty() {
            return Ok("No doctors have available slots at the moment.".to_string());
        }
        Ok(format!("Doctors with available slots: {}.", doctor_list(&doctors)))
    }
}

pub struct GetAvailableSpecializationsTool {
    clinic: Arc<ClinicContext>,
}

impl GetAvailableSpecializationsTool {
    pub fn new(clinic: Arc<ClinicContext>) -> Self {
        Self { clinic }
    }
}

#[async_trait]
impl Tool for GetAvailableSpecializationsTool {
    fn name(&self) -> &str {
        "get_available_specializations"
    }

    fn description(&self) -> &str {
        "List every specialization that has at least one free slot. No arguments."
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
        let specs = self
            .clinic
            .store
            .available_specializations()
            .await
            .map_err(|e| format!("Could not read availability: {e}"))?;
        if specs.is_empty() {
            return Ok("No specializations have available slots at the moment.".to_string());
        }
        let labels: Vec<String> = specs.iter().map(|s| s.replace('_', " ")).collect();
        Ok(format!("Specializations with available slots: {}.", labels.join(", ")))
    }
}

pub struct GetAvailableDoctorsOnDateTool {
    clinic: Arc<ClinicContext>,
}

impl GetAvailableDoctorsOnDateTool {
    pub fn new(clinic: Arc<ClinicContext>) -> Self {
        Self { clinic }
    }
}

#[async_trait]
impl Tool for GetAvailableDoctorsOnDateTool {
    fn name(&self) -> &str {
        "get_available_doctors_on_date"
    }

    fn description(&self) -> &str {
        "List doctors with at least one free slot on a date (DD-MM-YYYY)."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DateArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String, String> {
        let args: DateArgs = parse_args(args).map_err(|e| e.to_string())?;
        let date = validate_date(&args.desired_date).map_err(|e| e.to_string())?;
        let doctors = self
            .clinic
            .store
            .available_doctors(Some(&date))
            .await
            .map_err(|e| format!("Could not read availability: {e}"))?;
        if doctors.is_empty() {
            return Ok(format!("No doctors have available slots on {date}."));
        }
        Ok(format!(
            "Doctors with available slots on {date}: {}.",
            doctor_list(&doctors)
        ))
    }
}

fn doctor_list(doctors: &[String]) -> String {
    doctors
        .iter()
        .map(|d| format!("Dr. {}", display_doctor(d)))
        .collect::<Vec<_>>()
        .join(", ")
}
