//! Gateguard 交互式命令行
//!
//! 用法：gateguard [--session <id>] [--config <path>]
//! 每行输入发给执行图；遇到敏感动作时打印动作参数并询问 `approve? [y/N/reason]`，
//! 回答 y 批准执行，n 拒绝，其他文本作为拒绝理由交还给模型。

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use gateguard::agent::build_graph;
use gateguard::config::load_config;
use gateguard::core::GraphError;
use gateguard::react::{ApprovalGraph, Decision, GraphEvent, TurnOutcome, TurnReply};

struct CliArgs {
    session: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut out = CliArgs {
        session: None,
        config: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--session" => out.session = Some(args.next().context("--session needs a value")?),
            "--config" => out.config = Some(PathBuf::from(args.next().context("--config needs a value")?)),
            "-h" | "--help" => {
                println!("usage: gateguard [--session <id>] [--config <path>]");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(out)
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> anyhow::Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?)
}

/// 循环处理挂起：直到得到最终回复或输入结束
async fn settle(
    graph: &ApprovalGraph,
    lines: &mut Lines<BufReader<Stdin>>,
    mut reply: TurnReply,
) -> anyhow::Result<()> {
    loop {
        let action = match &reply.outcome {
            TurnOutcome::Final { text } => {
                println!("\n{text}\n");
                return Ok(());
            }
            TurnOutcome::Suspended { proposed_action } => proposed_action.clone(),
        };

        println!("\n[approval required] {} ({})", action.name, action.id);
        println!(
            "{}",
            serde_json::to_string_pretty(&action.arguments).unwrap_or_else(|_| "{}".to_string())
        );

        let decision = loop {
            let Some(input) = prompt(lines, "approve? [y/N/reason] ").await? else {
                println!("input closed, session {} stays suspended", reply.session_id);
                return Ok(());
            };
            match Decision::parse(&input) {
                Ok(d) => break d,
                Err(e) => println!("{e}"),
            }
        };

        reply = match graph.resume_action(&reply.session_id, &action.id, decision).await {
            Ok(r) => r,
            Err(GraphError::ApprovalExpired(id)) => {
                println!("approval for {id} expired, the action was not executed");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(error = %e, session = %reply.session_id, "resume failed");
                println!("error: {e}");
                return Ok(());
            }
        };
    }
}

fn print_event(ev: &GraphEvent) {
    match ev {
        GraphEvent::ToolResult {
            name,
            is_error,
            preview,
            ..
        } => {
            let tag = if *is_error { "error" } else { "ok" };
            println!("  · {name} [{tag}] {preview}");
        }
        GraphEvent::Nudge { attempt } => println!("  · no usable reply, nudging ({attempt})"),
        GraphEvent::Rejected { reason, .. } => println!("  · rejected: {reason}"),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gateguard::observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config).context("Failed to load config")?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            print_event(&ev);
        }
    });

    let graph = build_graph(&cfg, Some(event_tx)).context("Failed to build agent graph")?;
    let mut session = args.session;

    println!(
        "{} ready. Type a request, or 'exit' to quit.",
        cfg.app.name.as_deref().unwrap_or("gateguard")
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = prompt(&mut lines, "> ").await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match graph.start_or_continue(session.as_deref(), line).await {
            Ok(reply) => {
                session = Some(reply.session_id.clone());
                settle(&graph, &mut lines, reply).await?;
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("error: {e}");
            }
        }
    }

    Ok(())
}
