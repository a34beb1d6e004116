//! 种子号源导入
//!
//! CSV 表头：`date_slot,specialization,doctor_name,is_available,patient_to_attend`（列顺序以表头为准）。
//! patient_to_attend 可能是空、整数，或表格工具导出的浮点形式（`1234567.0`）。

use std::path::Path;

use crate::store::{PatientId, SlotRecord, SlotStore, StoreError};

const REQUIRED_COLUMNS: [&str; 5] = [
    "date_slot",
    "specialization",
    "doctor_name",
    "is_available",
    "patient_to_attend",
];

fn seed_err(line: usize, reason: impl Into<String>) -> StoreError {
    StoreError::Seed {
        line,
        reason: reason.into(),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_occupant(raw: &str) -> Result<Option<PatientId>, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value = raw
        .parse::<i64>()
        .or_else(|_| raw.parse::<f64>().map(|f| f as i64))
        .map_err(|_| format!("patient_to_attend is not a number: {raw}"))?;
    PatientId::new(value)
        .map(Some)
        .ok_or_else(|| format!("patient_to_attend is not a 7-8 digit id: {raw}"))
}

/// 解析 CSV 文本为号源记录；行号从 1 开始（表头为第 1 行）
pub fn parse_csv(text: &str) -> Result<Vec<SlotRecord>, StoreError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or_else(|| seed_err(1, "empty file"))?;
    let header: Vec<String> = header.split(',').map(|h| h.trim().to_ascii_lowercase()).collect();

    let mut index = [0usize; 5];
    for (slot, name) in index.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| seed_err(1, format!("missing column {name}")))?;
    }
    let [date_i, spec_i, doctor_i, avail_i, occupant_i] = index;

    let mut rows = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let cols: Vec<&str> = line.split(',').collect();
        let col = |i: usize| cols.get(i).map(|c| c.trim()).unwrap_or("");

        let is_available = parse_bool(col(avail_i))
            .ok_or_else(|| seed_err(line_no, format!("bad is_available: {}", col(avail_i))))?;
        let occupant = parse_occupant(col(occupant_i)).map_err(|e| seed_err(line_no, e))?;
        if is_available == occupant.is_some() {
            return Err(seed_err(line_no, "is_available must be false exactly when a patient is set"));
        }
        rows.push(SlotRecord {
            doctor_name: col(doctor_i).to_string(),
            specialization: col(spec_i).to_string(),
            date_slot: col(date_i).to_string(),
            is_available,
            patient_to_attend: occupant,
        });
    }
    Ok(rows)
}

/// 读取 CSV 文件并写入号源表，返回新增行数
pub async fn import_csv(store: &SlotStore, path: impl AsRef<Path>) -> Result<usize, StoreError> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    let rows = parse_csv(&text)?;
    let inserted = store.seed(rows).await?;
    tracing::info!(path = %path.as_ref().display(), inserted, "seeded doctor availability");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_with_float_occupant() {
        let text = "date_slot,specialization,doctor_name,is_available,patient_to_attend\n\
                    16-06-2025 10:00,cardiologist,sharma,True,\n\
                    16-06-2025 11:00,cardiologist,sharma,False,1234567.0\n";
        let rows = parse_csv(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_available);
        assert_eq!(rows[1].patient_to_attend, PatientId::new(1234567));
    }

    #[test]
    fn test_parse_csv_column_order_from_header() {
        let text = "doctor_name,date_slot,is_available,specialization,patient_to_attend\n\
                    rao,18-06-2025 08:00,1,dermatologist,\n";
        let rows = parse_csv(text).unwrap();
        assert_eq!(rows[0].doctor_name, "rao");
        assert_eq!(rows[0].specialization, "dermatologist");
    }

    #[test]
    fn test_parse_csv_rejects_inconsistent_row() {
        let text = "date_slot,specialization,doctor_name,is_available,patient_to_attend\n\
                    16-06-2025 10:00,cardiologist,sharma,True,1234567\n";
        match parse_csv(text) {
            Err(StoreError::Seed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected seed error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_csv_missing_column() {
        let text = "date_slot,doctor_name\n16-06-2025 10:00,sharma\n";
        assert!(matches!(parse_csv(text), Err(StoreError::Seed { line: 1, .. })));
    }
}
