//! 集成测试共用装配：临时 SQLite 号源库 + 脚本化 Mock LLM

#![allow(dead_code)]

use std::sync::Arc;

use docubot::graph::{GraphEvent, Orchestrator, OrchestratorBuilder};
use docubot::identity::IdentitySource;
use docubot::llm::MockLlmClient;
use docubot::store::{Database, PatientId, SlotRecord, SlotStore};
use docubot::tools::{ClinicContext, DoctorEntry, Roster};
use futures_util::StreamExt;
use tempfile::TempDir;

pub const PATIENT: i64 = 1234567;
pub const OTHER_PATIENT: i64 = 7654321;
pub const TODAY: &str = "15-06-2025";

pub fn patient() -> PatientId {
    PatientId::new(PATIENT).unwrap()
}

pub fn other_patient() -> PatientId {
    PatientId::new(OTHER_PATIENT).unwrap()
}

pub fn roster() -> Roster {
    Roster::new(vec![
        DoctorEntry {
            name: "sharma".into(),
            specialization: "cardiologist".into(),
        },
        DoctorEntry {
            name: "emily johnson".into(),
            specialization: "orthodontist".into(),
        },
    ])
}

/// 磁盘上的号源库（随 TempDir 一起删除）
pub struct Fixture {
    pub dir: TempDir,
    pub store: SlotStore,
}

pub async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("clinic.db")).unwrap();
    let store = SlotStore::new(db);
    store
        .seed(vec![
            SlotRecord::free("sharma", "cardiologist", "16-06-2025 10:00"),
            SlotRecord::free("sharma", "cardiologist", "16-06-2025 11:00"),
            SlotRecord::booked("sharma", "cardiologist", "16-06-2025 12:00", other_patient()),
            SlotRecord::free("emily johnson", "orthodontist", "16-06-2025 09:00"),
        ])
        .await
        .unwrap();
    Fixture { dir, store }
}

pub fn clinic(store: &SlotStore, identity: IdentitySource) -> Arc<ClinicContext> {
    Arc::new(ClinicContext::new(store.clone(), roster(), identity))
}

pub fn engine(mock: Arc<MockLlmClient>, store: &SlotStore) -> Arc<Orchestrator> {
    Arc::new(
        OrchestratorBuilder::new(mock, clinic(store, IdentitySource::Session))
            .with_today(TODAY)
            .build()
            .unwrap(),
    )
}

pub async fn collect(stream: impl futures_util::Stream<Item = GraphEvent>) -> Vec<GraphEvent> {
    stream.collect().await
}

/// 所有 TextChunk 拼接后的文本
pub fn text_of(events: &[GraphEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            GraphEvent::TextChunk { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

pub fn tool_results(events: &[GraphEvent]) -> Vec<(String, bool, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            GraphEvent::ToolResult { tool, ok, preview, .. } => Some((tool.clone(), *ok, preview.clone())),
            _ => None,
        })
        .collect()
}
