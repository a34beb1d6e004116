//! DocuBot 命令行入口
//!
//! 每行标准输入是一次请求，回复以 NDJSON 记录写到标准输出；日志写标准错误。
//!
//! 用法：`docubot [--config <path>] [--patient <id>] [--thread <id>]`

use std::path::PathBuf;

use anyhow::{bail, Context};
use docubot::config::load_config;
use docubot::store::PatientId;
use docubot::stream::ndjson_lines;
use docubot::{build_from_config, observability, TurnRequest};
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    patient: Option<PatientId>,
    thread: Option<String>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = CliArgs::default();
    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        let mut value = || it.next().with_context(|| format!("{flag} requires a value"));
        match flag.as_str() {
            "--config" => args.config = Some(PathBuf::from(value()?)),
            "--patient" => {
                let raw = value()?;
                let id = raw
                    .parse::<i64>()
                    .ok()
                    .and_then(PatientId::new)
                    .with_context(|| format!("invalid patient id '{raw}' (expected 7-8 digits)"))?;
                args.patient = Some(id);
            }
            "--thread" => args.thread = Some(value()?),
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config.clone()).context("Failed to load config")?;
    let engine = build_from_config(&cfg).await.context("Failed to build orchestrator")?;

    let thread_id = args
        .thread
        .clone()
        .or_else(|| args.patient.map(|p| p.to_string()))
        .unwrap_or_else(|| "cli".to_string());
    tracing::info!(thread_id = %thread_id, "docubot ready, one request per line");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        let req = TurnRequest {
            thread_id: thread_id.clone(),
            query: query.to_string(),
            patient_id: args.patient,
        };
        let mut records = Box::pin(ndjson_lines(engine.stream_turn(req)));
        while let Some(record) = records.next().await {
            stdout.write_all(record.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
