//! 患者身份
//!
//! 一次部署只认一个身份来源（`[identity].source`）：
//! - `session`：身份来自已认证会话（线程 ID），工具参数中出现 patient_id 会被拒绝；
//! - `arguments`：身份由工具参数显式给出并校验，会话身份不参与工具调用。
//!
//! 凭证的签发与校验在外部完成；这里只消费解析后的整数 ID。

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::config::CredentialEntry;
use crate::store::PatientId;

/// 预约类工具的患者身份来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    #[default]
    Session,
    Arguments,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("not authenticated")]
    Missing,

    #[error("invalid credential")]
    Invalid,
}

/// 把外部凭证解析为患者 ID（凭证格式对核心不可见）
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<PatientId, IdentityError>;
}

/// 固定映射表：凭证 -> 患者 ID（开发环境与测试用；生产环境接入真正的令牌校验服务）
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityProvider {
    credentials: HashMap<String, PatientId>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, credential: impl Into<String>, patient: PatientId) -> Self {
        self.credentials.insert(credential.into(), patient);
        self
    }

    /// 从 `[[identity.credentials]]` 构建；患者 ID 不合法的条目跳过并记录 warn
    pub fn from_entries(entries: &[CredentialEntry]) -> Self {
        entries.iter().fold(Self::new(), |provider, entry| match PatientId::new(entry.patient_id) {
            Some(id) => provider.with(entry.token.clone(), id),
            None => {
                tracing::warn!(patient_id = entry.patient_id, "ignoring credential with invalid patient id");
                provider
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(&self, credential: &str) -> Result<PatientId, IdentityError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(IdentityError::Missing);
        }
        self.credentials
            .get(credential)
            .copied()
            .ok_or(IdentityError::Invalid)
    }
}

/// 去掉 `Bearer ` 前缀
pub fn bearer_token(header_value: &str) -> &str {
    header_value
        .strip_prefix("Bearer ")
        .unwrap_or(header_value)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider() {
        let id = PatientId::new(1234567).unwrap();
        let provider = StaticIdentityProvider::new().with("tok-1", id);
        assert_eq!(provider.resolve(bearer_token("Bearer tok-1")), Ok(id));
        assert_eq!(provider.resolve("tok-2"), Err(IdentityError::Invalid));
        assert_eq!(provider.resolve(" "), Err(IdentityError::Missing));
    }

    #[test]
    fn test_from_entries_skips_invalid_ids() {
        let provider = StaticIdentityProvider::from_entries(&[
            CredentialEntry {
                token: "good".into(),
                patient_id: 1234567,
            },
            CredentialEntry {
                token: "bad".into(),
                patient_id: 42,
            },
        ]);
        assert_eq!(provider.resolve("good"), Ok(PatientId::new(1234567).unwrap()));
        assert_eq!(provider.resolve("bad"), Err(IdentityError::Invalid));
    }

    #[test]
    fn test_identity_source_deserialize() {
        let src: IdentitySource = serde_json::from_str("\"arguments\"").unwrap();
        assert_eq!(src, IdentitySource::Arguments);
        assert_eq!(IdentitySource::default(), IdentitySource::Session);
    }
}
