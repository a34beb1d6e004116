//! 对外 NDJSON 流：编排事件经适配器后的记录序列

mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use docubot::llm::MockLlmClient;
    use docubot::stream::{adapt, ndjson_lines, StreamRecord};
    use docubot::TurnRequest;
    use futures_util::StreamExt;

    use crate::common::*;

    fn request(query: &str) -> TurnRequest {
        TurnRequest::for_patient(patient(), query)
    }

    #[tokio::test]
    async fn test_tool_announced_once_then_reply_text() {
        let fx = fixture().await;
        let mock = Arc::new(
            MockLlmClient::scripted([
                r#"{"next": "continue", "rewritten_query": "Which specializations are available?"}"#,
                r#"{"next": "information", "reasoning": "Listing specializations."}"#,
                r#"{"tool": "get_available_specializations", "args": {}}"#,
                "We have cardiologist and orthodontist slots.",
                r#"{"next": "finish", "reasoning": "Answered."}"#,
            ])
            .with_chunk_chars(4),
        );
        let engine = engine(mock, &fx.store);

        let records: Vec<StreamRecord> = adapt(engine.stream_turn(request("what specialties do you have"))).collect().await;

        assert_eq!(
            records[0],
            StreamRecord::Tool {
                tool_name: "get_available_specializations".into()
            }
        );
        let tools = records.iter().filter(|r| matches!(r, StreamRecord::Tool { .. })).count();
        assert_eq!(tools, 1);
        let text: String = records
            .iter()
            .filter_map(|r| match r {
                StreamRecord::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "We have cardiologist and orthodontist slots.");
        // 逐片段输出
        assert!(records.len() > 3);
    }

    #[tokio::test]
    async fn test_tool_call_after_prose_never_reaches_client_as_text() {
        let fx = fixture().await;
        let mock = Arc::new(
            MockLlmClient::scripted([
                r#"{"next": "continue", "rewritten_query": "Is Dr. Sharma available on 16-06-2025?"}"#,
                r#"{"next": "information", "reasoning": "Availability question."}"#,
                "Let me check that for you.\n{\"tool\": \"check_availability_by_doctor\", \"args\": {\"doctor_name\": \"Sharma\", \"desired_date\": \"16-06-2025\"}}",
                r#"{"tool": "check_availability_by_doctor", "args": {"doctor_name": "Sharma", "desired_date": "16-06-2025"}}"#,
                "Dr. Sharma is free at 10:00 and 11:00.",
                r#"{"next": "finish", "reasoning": "Answered."}"#,
            ])
            .with_chunk_chars(5),
        );
        let engine = engine(mock.clone(), &fx.store);

        let records: Vec<StreamRecord> = adapt(engine.stream_turn(request("is sharma free tomorrow"))).collect().await;

        let text: String = records
            .iter()
            .filter_map(|r| match r {
                StreamRecord::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert!(!text.contains('{'));
        assert!(!text.contains("\"tool\""));
        assert!(text.ends_with("Dr. Sharma is free at 10:00 and 11:00."));
        let tools = records.iter().filter(|r| matches!(r, StreamRecord::Tool { .. })).count();
        assert_eq!(tools, 1);
        assert!(!records.iter().any(|r| matches!(r, StreamRecord::Error { .. })));
        // 混合输出被退回，下一次调用带上纠正提示
        assert!(mock.calls()[3].last().unwrap().content.contains("mixed prose"));
        assert_eq!(mock.call_count(), 6);
    }

    #[tokio::test]
    async fn test_handler_error_record_then_stream_continues() {
        let fx = fixture().await;
        let mock = Arc::new(
            MockLlmClient::scripted([
                r#"{"next": "continue", "rewritten_query": "Book Dr. Sharma on 16-06-2025 10:00"}"#,
                r#"{"next": "booking", "reasoning": "Booking request."}"#,
            ])
            .then_err("upstream timeout")
            .then(r#"{"next": "information", "reasoning": "Try to at least show availability."}"#)
            .then("Dr. Sharma has free slots at 10:00 and 11:00.")
            .then(r#"{"next": "finish", "reasoning": "Done."}"#),
        );
        let engine = engine(mock, &fx.store);

        let lines: Vec<String> = ndjson_lines(engine.stream_turn(request("book sharma tomorrow 10am")))
            .collect()
            .await;

        let records: Vec<StreamRecord> = lines
            .iter()
            .map(|l| serde_json::from_str(l.trim_end()).unwrap())
            .collect();
        let error_at = records
            .iter()
            .position(|r| matches!(r, StreamRecord::Error { message } if message.contains("upstream timeout")))
            .unwrap();
        assert!(records[error_at + 1..]
            .iter()
            .any(|r| matches!(r, StreamRecord::Text { .. })));
        assert!(!records.iter().any(StreamRecord::is_terminal));
        assert!(lines.iter().all(|l| l.ends_with('\n') && l.matches('\n').count() == 1));
    }

    #[tokio::test]
    async fn test_router_failure_is_fatal_record() {
        let fx = fixture().await;
        let mock = Arc::new(
            MockLlmClient::scripted([r#"{"next": "continue", "rewritten_query": "Is Dr. Sharma free?"}"#])
                .then_err("401 Unauthorized"),
        );
        let engine = engine(mock, &fx.store);

        let records: Vec<StreamRecord> = adapt(engine.stream_turn(request("is sharma free"))).collect().await;

        assert_eq!(records.len(), 1);
        assert!(matches!(&records[0], StreamRecord::FatalError { message } if message.contains("401")));
    }
}
