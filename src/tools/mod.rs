//! 领域工具
//!
//! 信息处理器绑定查询类工具，预约处理器绑定预约 / 取消 / 改约；两组工具互不相交，
//! 各自装入独立的 ToolRegistry。

pub mod availability;
pub mod booking;
pub mod clinic;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod validate;

use std::sync::Arc;

pub use availability::{
    CheckAvailabilityByDoctorTool, CheckAvailabilityBySpecializationTool, GetAvailableDoctorsOnDateTool,
    GetAvailableDoctorsTool, GetAvailableSpecializationsTool,
};
pub use booking::{BookAppointmentTool, CancelAppointmentTool, RescheduleAppointmentTool};
pub use clinic::ClinicContext;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolContext, ToolRegistry};
pub use schema::tool_call_schema_json;
pub use validate::{DoctorEntry, Roster, ValidationError};

/// 信息处理器的工具集（只读查询）
pub fn information_tools(clinic: &Arc<ClinicContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CheckAvailabilityByDoctorTool::new(clinic.clone()));
    registry.register(CheckAvailabilityBySpecializationTool::new(clinic.clone()));
    registry.register(GetAvailableDoctorsTool::new(clinic.clone()));
    registry.register(GetAvailableSpecializationsTool::new(clinic.clone()));
    registry.register(GetAvailableDoctorsOnDateTool::new(clinic.clone()));
    registry
}

/// 预约处理器的工具集（变更号源）
pub fn booking_tools(clinic: &Arc<ClinicContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(BookAppointmentTool::new(clinic.clone()));
    registry.register(CancelAppointmentTool::new(clinic.clone()));
    registry.register(RescheduleAppointmentTool::new(clinic.clone()));
    registry
}
