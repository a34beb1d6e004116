//! 号源查询与变更
//!
//! 每个变更都是针对目标行的条件更新（compare-and-set）：`UPDATE ... WHERE 条件`，
//! 以受影响行数判定成败，检查与写入在同一条语句内完成，不存在「先读后写」的窗口。
//! 改约涉及两行，在 `BEGIN IMMEDIATE` 事务中先校验两个前置条件再依次更新。

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::store::slot::time_part;
use crate::store::{Database, PatientId, SlotRecord, StoreError};

/// 预约结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookOutcome {
    Booked,
    /// 不存在该 (医生, 时间) 的空闲行
    Unavailable,
}

/// 取消结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// 该患者在此号源上没有预约
    NotFound,
}

/// 改约结果；任一前置条件不满足时不做任何修改
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleOutcome {
    Rescheduled,
    /// 旧号源不属于该患者
    OldSlotNotHeld,
    /// 新号源不空闲
    NewSlotUnavailable,
}

/// 号源存储
#[derive(Clone)]
pub struct SlotStore {
    db: Database,
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SlotRecord> {
    let occupant: Option<i64> = row.get(4)?;
    Ok(SlotRecord {
        doctor_name: row.get(0)?,
        specialization: row.get(1)?,
        date_slot: row.get(2)?,
        is_available: row.get(3)?,
        patient_to_attend: occupant.and_then(PatientId::new),
    })
}

fn slot_is_free(conn: &Connection, doctor: &str, date_slot: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM doctor_availability
         WHERE doctor_name = ?1 AND date_slot = ?2 AND is_available = 1",
        params![doctor, date_slot],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn slot_held_by(
    conn: &Connection,
    doctor: &str,
    date_slot: &str,
    patient: i64,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM doctor_availability
         WHERE doctor_name = ?1 AND date_slot = ?2 AND is_available = 0 AND patient_to_attend = ?3",
        params![doctor, date_slot, patient],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

const CLAIM_SQL: &str = "UPDATE doctor_availability SET is_available = 0, patient_to_attend = ?3
     WHERE doctor_name = ?1 AND date_slot = ?2 AND is_available = 1";

const RELEASE_SQL: &str = "UPDATE doctor_availability SET is_available = 1, patient_to_attend = NULL
     WHERE doctor_name = ?1 AND date_slot = ?2 AND is_available = 0 AND patient_to_attend = ?3";

impl SlotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// 写入种子号源；(医生, 时间) 已存在的行保持不变
    pub async fn seed(&self, rows: Vec<SlotRecord>) -> Result<usize, StoreError> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO doctor_availability
                         (doctor_name, specialization, date_slot, is_available, patient_to_attend)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for r in &rows {
                        inserted += stmt.execute(params![
                            r.doctor_name,
                            r.specialization,
                            r.date_slot,
                            r.is_available,
                            r.patient_to_attend.map(PatientId::get),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await
    }

    /// 精确查询一行
    pub async fn get(&self, doctor: &str, date_slot: &str) -> Result<Option<SlotRecord>, StoreError> {
        let (doctor, date_slot) = (doctor.to_string(), date_slot.to_string());
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT doctor_name, specialization, date_slot, is_available, patient_to_attend
                         FROM doctor_availability WHERE doctor_name = ?1 AND date_slot = ?2",
                        params![doctor, date_slot],
                        row_to_record,
                    )
                    .optional()?)
            })
            .await
    }

    /// 全部号源（按医生、时间排序）
    pub async fn all(&self) -> Result<Vec<SlotRecord>, StoreError> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT doctor_name, specialization, date_slot, is_available, patient_to_attend
                     FROM doctor_availability ORDER BY doctor_name, date_slot",
                )?;
                let rows = stmt.query_map([], row_to_record)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    /// 某医生某天的空闲时间（HH:MM，升序）；医生名大小写不敏感，日期按前缀匹配
    pub async fn free_times_for_doctor(&self, doctor: &str, date: &str) -> Result<Vec<String>, StoreError> {
        let (doctor, date) = (doctor.to_string(), date.to_string());
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT date_slot FROM doctor_availability
                     WHERE doctor_name = ?1 AND substr(date_slot, 1, 10) = ?2 AND is_available = 1
                     ORDER BY substr(date_slot, 12)",
                )?;
                let rows = stmt.query_map(params![doctor, date], |row| row.get::<_, String>(0))?;
                let mut times = Vec::new();
                for slot in rows {
                    times.push(time_part(&slot?).to_string());
                }
                Ok(times)
            })
            .await
    }

    /// 某专科某天的空闲号源 (医生, HH:MM)
    pub async fn free_slots_for_specialization(
        &self,
        specialization: &str,
        date: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let (specialization, date) = (specialization.to_string(), date.to_string());
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT doctor_name, date_slot FROM doctor_availability
                     WHERE specialization = ?1 AND substr(date_slot, 1, 10) = ?2 AND is_available = 1
                     ORDER BY substr(date_slot, 12), doctor_name",
                )?;
                let rows = stmt.query_map(params![specialization, date], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut slots = Vec::new();
                for row in rows {
                    let (doctor, slot) = row?;
                    slots.push((doctor, time_part(&slot).to_string()));
                }
                Ok(slots)
            })
            .await
    }

    /// 有空闲号源的医生（去重）；date 为 Some 时只看该日
    pub async fn available_doctors(&self, date: Option<&str>) -> Result<Vec<String>, StoreError> {
        let date = date.map(str::to_string);
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT lower(doctor_name) FROM doctor_availability
                     WHERE is_available = 1 AND (?1 IS NULL OR substr(date_slot, 1, 10) = ?1)
                     ORDER BY 1",
                )?;
                let rows = stmt.query_map(params![date], |row| row.get::<_, String>(0))?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    /// 有空闲号源的专科（去重）
    pub async fn available_specializations(&self) -> Result<Vec<String>, StoreError> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT lower(specialization) FROM doctor_availability
                     WHERE is_available = 1 ORDER BY 1",
                )?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    /// 原子占用：仅当该行存在且空闲时成功
    pub async fn book(&self, doctor: &str, date_slot: &str, patient: PatientId) -> Result<BookOutcome, StoreError> {
        let (doctor, date_slot) = (doctor.to_string(), date_slot.to_string());
        self.db
            .call(move |conn| {
                let changed = conn.execute(CLAIM_SQL, params![doctor, date_slot, patient.get()])?;
                Ok(if changed == 1 {
                    BookOutcome::Booked
                } else {
                    BookOutcome::Unavailable
                })
            })
            .await
    }

    /// 原子释放：仅当该行由此患者占用时成功
    pub async fn cancel(&self, doctor: &str, date_slot: &str, patient: PatientId) -> Result<CancelOutcome, StoreError> {
        let (doctor, date_slot) = (doctor.to_string(), date_slot.to_string());
        self.db
            .call(move |conn| {
                let changed = conn.execute(RELEASE_SQL, params![doctor, date_slot, patient.get()])?;
                Ok(if changed == 1 {
                    CancelOutcome::Cancelled
                } else {
                    CancelOutcome::NotFound
                })
            })
            .await
    }

    /// 改约：旧号源属于该患者且新号源空闲时，释放旧号源并占用新号源，作为一个事务提交
    pub async fn reschedule(
        &self,
        doctor: &str,
        old_slot: &str,
        new_slot: &str,
        patient: PatientId,
    ) -> Result<RescheduleOutcome, StoreError> {
        let (doctor, old_slot, new_slot) = (doctor.to_string(), old_slot.to_string(), new_slot.to_string());
        self.db
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if !slot_held_by(&tx, &doctor, &old_slot, patient.get())? {
                    return Ok(RescheduleOutcome::OldSlotNotHeld);
                }
                if !slot_is_free(&tx, &doctor, &new_slot)? {
                    return Ok(RescheduleOutcome::NewSlotUnavailable);
                }
                let released = tx.execute(RELEASE_SQL, params![doctor, old_slot, patient.get()])?;
                let claimed = tx.execute(CLAIM_SQL, params![doctor, new_slot, patient.get()])?;
                if released != 1 || claimed != 1 {
                    // 事务内已持有写锁，理论上不会发生；丢弃 tx 即回滚
                    return Ok(RescheduleOutcome::NewSlotUnavailable);
                }
                tx.commit()?;
                Ok(RescheduleOutcome::Rescheduled)
            })
            .await
    }
}
