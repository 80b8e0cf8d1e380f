//! Findings formatters
//!
//! Machine output (JSONL) and human output (text) both go to stdout; logs
//! and progress stay on stderr so pipelines can consume findings cleanly.

use crate::error::Result;
use crate::models::Finding;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::io::Write;

/// Writes findings as JSONL: one object per line, newest first as queried.
pub fn write_jsonl<W: Write>(findings: &[Finding], out: &mut W, verbose: bool) -> Result<()> {
    for finding in findings {
        let injection = json!({
            "target_url": finding.target_url,
            "parameter": finding.parameter,
            "payload": finding.payload,
            "context": finding.context,
            "injected_at": finding.injected_at,
        });
        let mut callback = json!({
            "source_ip": finding.source_ip,
            "request_path": finding.request_path,
            "received_at": finding.received_at,
            "delay_seconds": (finding.delay_seconds() * 100.0).round() / 100.0,
        });
        if let Some(metadata) = finding.metadata() {
            callback["metadata"] = serde_json::Value::Object(metadata);
        }

        if verbose {
            callback["headers"] = serde_json::to_value(&finding.callback_headers)?;
            if let Some(body) = finding.callback_body.as_deref() {
                match std::str::from_utf8(body) {
                    Ok(text) => callback["body"] = json!(text),
                    Err(_) => callback["body_base64"] = json!(BASE64.encode(body)),
                }
            }
        }

        let record = json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "tool": "ricochet",
            "finding": {
                "correlation_id": finding.token,
                "severity": finding.severity().to_string(),
                "injection": injection,
                "callback": callback,
            }
        });
        writeln!(out, "{record}")?;
    }
    Ok(())
}

/// Writes findings as human-readable text.
pub fn write_text<W: Write>(findings: &[Finding], out: &mut W, verbose: bool) -> Result<()> {
    if findings.is_empty() {
        writeln!(out, "No findings.")?;
        return Ok(());
    }

    writeln!(out, "=== Ricochet Findings ({}) ===", findings.len())?;
    writeln!(out)?;

    for (i, finding) in findings.iter().enumerate() {
        let icon = match finding.severity() {
            crate::models::Severity::High => "[!]",
            crate::models::Severity::Medium => "[+]",
            crate::models::Severity::Low => "[*]",
            crate::models::Severity::Info => "[-]",
        };

        writeln!(out, "{icon} Finding #{}", i + 1)?;
        writeln!(out, "    Correlation ID: {}", finding.token)?;
        writeln!(out, "    Target: {}", finding.target_url)?;
        writeln!(out, "    Parameter: {}", finding.parameter)?;
        writeln!(
            out,
            "    Severity: {}",
            finding.severity().to_string().to_uppercase()
        )?;
        writeln!(out, "    Delay: {:.2}s", finding.delay_seconds())?;

        if verbose {
            writeln!(out)?;
            writeln!(out, "    Payload: {}", finding.payload)?;
            if let Some(ctx) = &finding.context {
                writeln!(out, "    Context: {ctx}")?;
            }
            writeln!(out, "    Callback from: {}", finding.source_ip)?;
            writeln!(out, "    Callback path: {}", finding.request_path)?;
            if !finding.callback_headers.is_empty() {
                writeln!(out, "    Callback headers: {:?}", finding.callback_headers)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}
