//! 诊所工具共享上下文：号源存储、医生名单、身份来源、通知分发

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::identity::IdentitySource;
use crate::notify::NotificationDispatcher;
use crate::store::{PatientId, SlotStore};
use crate::tools::validate::{validate_patient_id, Roster, ValidationError};
use crate::tools::ToolContext;

/// 所有诊所工具共享（以 Arc 持有）
pub struct ClinicContext {
    pub store: SlotStore,
    pub roster: Roster,
    pub identity: IdentitySource,
    pub notifications: Option<NotificationDispatcher>,
}

impl ClinicContext {
    pub fn new(store: SlotStore, roster: Roster, identity: IdentitySource) -> Self {
        Self {
            store,
            roster,
            identity,
            notifications: None,
        }
    }

    pub fn with_notifications(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.notifications = Some(dispatcher);
        self
    }

    /// 按部署的身份来源确定患者：两种来源不会同时被接受
    pub fn resolve_patient(
        &self,
        arg: Option<&Value>,
        ctx: &ToolContext,
    ) -> Result<PatientId, ValidationError> {
        match self.identity {
            IdentitySource::Session => {
                if arg.is_some_and(|v| !v.is_null()) {
                    return Err(ValidationError::UnexpectedArgument(
                        "patient_id",
                        "the patient is taken from the authenticated session",
                    ));
                }
                ctx.patient.ok_or(ValidationError::MissingIdentity)
            }
            IdentitySource::Arguments => match arg {
                Some(v) if !v.is_null() => validate_patient_id(v),
                _ => Err(ValidationError::MissingArgument("patient_id")),
            },
        }
    }

    /// 预约类变更成功后发送通知（若已配置）
    pub fn notify(&self, patient: PatientId, subject: &str, body: &str) {
        if let Some(dispatcher) = &self.notifications {
            // 不等待投递结果
            let _ = dispatcher.dispatch(patient, subject, body);
        }
    }
}

/// 反序列化工具参数；失败时给出可读的校验错误
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ValidationError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ValidationError::Malformed(e.to_string()))
}
