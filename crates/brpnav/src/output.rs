use std::io::IsTerminal;

use brpnav_conformance::matrix::format_matrix;
use brpnav_conformance::{CaseReport, SessionReport};
use brpnav_frame::{Body, Message};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_reports(reports: &[CaseReport], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for report in reports {
                print_json(report);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CASE", "RESULT", "STEP", "ELAPSED", "DETAIL"]);
            for report in reports {
                table.add_row(vec![
                    report.name.clone(),
                    result_label(report).to_string(),
                    report
                        .point
                        .map(|point| point.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    format!("{:.2}s", report.elapsed.as_secs_f64()),
                    detail(report),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for report in reports {
                println!(
                    "{}: {} ({:.2}s) {}",
                    report.name,
                    result_label(report),
                    report.elapsed.as_secs_f64(),
                    detail(report)
                );
            }
        }
    }
}

fn result_label(report: &CaseReport) -> &'static str {
    match report.status {
        brpnav_conformance::CaseStatus::Passed => "PASS",
        brpnav_conformance::CaseStatus::Failed => "FAIL",
        brpnav_conformance::CaseStatus::Error => "ERROR",
    }
}

fn detail(report: &CaseReport) -> String {
    if let Some(message) = &report.message {
        return message.clone();
    }
    match &report.summary {
        Some(summary) => format!(
            "{} phases, {} position updates, {} sent / {} received",
            summary.phases.len(),
            summary.position_updates,
            summary.messages.sent,
            summary.messages.received
        ),
        None => String::new(),
    }
}

#[derive(Serialize)]
struct SessionOutput<'a> {
    peer: &'a str,
    #[serde(flatten)]
    report: &'a SessionReport,
}

pub fn print_session(report: &SessionReport, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SessionOutput { peer, report }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "COMMANDS", "SENT", "RECEIVED", "PHASE"])
                .add_row(vec![
                    peer.to_string(),
                    report.commands.to_string(),
                    report.messages.sent.to_string(),
                    report.messages.received.to_string(),
                    phase_label(report),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} commands={} sent={} received={} phase={}",
                peer,
                report.commands,
                report.messages.sent,
                report.messages.received,
                phase_label(report)
            );
        }
    }
}

fn phase_label(report: &SessionReport) -> String {
    report
        .robot
        .phase()
        .map(|phase| phase.to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    message_type: &'a str,
    device_name: &'a str,
    timestamp: u32,
    body: serde_json::Value,
}

pub fn print_message(message: &Message, format: OutputFormat) {
    let header = &message.header;
    match format {
        OutputFormat::Json => print_json(&MessageOutput {
            message_type: header.message_type.as_str(),
            device_name: &header.device_name,
            timestamp: header.timestamp_seconds(),
            body: body_json(&message.body),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "NAME", "CONTENT"])
                .add_row(vec![
                    header.message_type.to_string(),
                    header.device_name.clone(),
                    body_preview(&message.body),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} name={} {}",
                header.message_type,
                header.device_name,
                body_preview(&message.body).replace('\n', " ")
            );
        }
    }
}

fn body_json(body: &Body) -> serde_json::Value {
    let value = match body {
        Body::String(string) => serde_json::to_value(string),
        Body::Status(status) => serde_json::to_value(status),
        Body::Transform(matrix) => serde_json::to_value(matrix),
        Body::GetStatus | Body::GetTransform => Ok(serde_json::Value::Null),
        Body::Other { payload, .. } => Ok(serde_json::json!({ "size": payload.len() })),
    };
    value.unwrap_or(serde_json::Value::Null)
}

fn body_preview(body: &Body) -> String {
    match body {
        Body::String(string) => string.text.clone(),
        Body::Status(status) => {
            let mut text = brpnav_frame::types::describe_code(status.code);
            if let Some(name) = &status.error_name {
                text.push_str(&format!(" error_name={name}"));
            }
            if let Some(message) = &status.status_string {
                text.push_str(&format!(" \"{message}\""));
            }
            text
        }
        Body::Transform(matrix) => format_matrix(matrix),
        Body::GetStatus | Body::GetTransform => String::new(),
        Body::Other { payload, .. } => format!("<{} bytes>", payload.len()),
    }
}
