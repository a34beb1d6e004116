//! 患者通讯录：用于解析通知收件人

use rusqlite::{params, OptionalExtension};

use crate::store::{Database, PatientId, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientRecord {
    pub patient_id: PatientId,
    pub fullname: String,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct PatientDirectory {
    db: Database,
}

impl PatientDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 新增或更新患者
    pub async fn upsert(&self, record: PatientRecord) -> Result<(), StoreError> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO patients (patient_id, fullname, email) VALUES (?1, ?2, ?3)
                     ON CONFLICT(patient_id) DO UPDATE SET fullname = excluded.fullname, email = excluded.email",
                    params![record.patient_id.get(), record.fullname, record.email],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, patient_id: PatientId) -> Result<Option<PatientRecord>, StoreError> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT fullname, email FROM patients WHERE patient_id = ?1",
                        params![patient_id.get()],
                        |row| {
                            Ok(PatientRecord {
                                patient_id,
                                fullname: row.get(0)?,
                                email: row.get(1)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    /// 收件邮箱；患者不存在或未登记邮箱时为 None
    pub async fn email_of(&self, patient_id: PatientId) -> Result<Option<String>, StoreError> {
        Ok(self.get(patient_id).await?.and_then(|p| p.email))
    }
}
