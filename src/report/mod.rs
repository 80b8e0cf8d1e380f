//! Markdown bug-bounty report rendering
//!
//! Consumes `Finding` records and renders a submission-ready report. The
//! vulnerability class comes from the injection's context tag; timing and
//! exfiltrated metadata shape the reproduction steps and impact wording.

use crate::error::Result;
use crate::models::Finding;
use chrono::{TimeZone, Utc};
use std::path::Path;

/// Vulnerability class selected from the context tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VulnClass {
    Xss,
    Sqli,
    Ssti,
    Generic,
}

impl VulnClass {
    fn from_context(context: Option<&str>) -> Self {
        let ctx = context.unwrap_or("").to_lowercase();
        if ctx.contains("xss") {
            VulnClass::Xss
        } else if ctx.contains("sqli") || ctx.contains("sql") {
            VulnClass::Sqli
        } else if ctx.contains("ssti") {
            VulnClass::Ssti
        } else {
            VulnClass::Generic
        }
    }

    fn title(&self) -> &'static str {
        match self {
            VulnClass::Xss => "Cross-Site Scripting (XSS)",
            VulnClass::Sqli => "Out-of-Band SQL Injection",
            VulnClass::Ssti => "Server-Side Template Injection (SSTI)",
            VulnClass::Generic => "Second-Order Vulnerability",
        }
    }

    fn impact(&self) -> &'static str {
        match self {
            VulnClass::Xss => {
                "- Execute arbitrary JavaScript in victims' browsers\n\
                 - Steal session cookies and hijack user accounts (if not HttpOnly)\n\
                 - Perform actions on behalf of authenticated users"
            }
            VulnClass::Sqli => {
                "- Extract sensitive data from the database\n\
                 - Exfiltrate query results over out-of-band channels\n\
                 - Potentially escalate to command execution via database features"
            }
            VulnClass::Ssti => {
                "- Execute arbitrary code in the template rendering process\n\
                 - Read server-side files and secrets\n\
                 - Pivot into the internal network"
            }
            VulnClass::Generic => {
                "- Trigger out-of-band interactions from internal systems\n\
                 - Evidence of payload execution in a second-order context"
            }
        }
    }

    fn remediation(&self) -> &'static str {
        match self {
            VulnClass::Xss => {
                "- Apply contextual output encoding wherever stored data is rendered\n\
                 - Deploy a restrictive Content-Security-Policy\n\
                 - Set HttpOnly on session cookies"
            }
            VulnClass::Sqli => {
                "- Use parameterized queries or prepared statements everywhere\n\
                 - Restrict outbound network access from database hosts\n\
                 - Disable dangerous database features (xp_dirtree, UTL_HTTP, dblink)"
            }
            VulnClass::Ssti => {
                "- Never feed user input into template source\n\
                 - Use sandboxed or logic-less template engines for user content"
            }
            VulnClass::Generic => {
                "- Treat all stored user input as untrusted at render time\n\
                 - Audit background processors and admin views that consume this field"
            }
        }
    }
}

/// Renders one finding as a Markdown report.
pub fn generate_report(finding: &Finding) -> String {
    let class = VulnClass::from_context(finding.context.as_deref());
    let delay = finding.delay_seconds();
    let severity = finding.severity().to_string().to_uppercase();

    let trigger_step = if delay > 3600.0 {
        format!(
            "Wait for admin/moderator review (delay observed: {delay:.0} seconds / {:.1} hours)",
            delay / 3600.0
        )
    } else if delay > 60.0 {
        format!("Wait for background processing (delay observed: {delay:.0} seconds)")
    } else {
        "Payload executes immediately or shortly after submission".to_string()
    };

    let execution_context = infer_execution_context(finding);
    let callback_time = Utc
        .timestamp_opt(finding.received_at as i64, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{:.0}", finding.received_at));

    let mut report = format!(
        "## Summary\n\
         {title} in `{parameter}` parameter at `{target_url}`\n\n\
         ## Severity\n\
         {severity} - callback-confirmed execution in {execution_context}\n\n\
         ## Steps to Reproduce\n\
         1. Navigate to: `{target_url}`\n\
         2. Submit the following payload in the `{parameter}` field:\n\
            ```\n   {payload}\n   ```\n\
         3. {trigger_step}\n\
         4. Observe the out-of-band callback at: `{request_path}`\n\n\
         ## Proof of Concept\n\
         - **Correlation ID:** `{token}`\n\
         - **Injection Point:** `{target_url}` (parameter: `{parameter}`)\n\
         - **Callback Source:** `{source_ip}`\n\
         - **Callback Received:** {callback_time}\n\
         - **Delay:** {delay:.1} seconds\n",
        title = class.title(),
        parameter = finding.parameter,
        target_url = finding.target_url,
        payload = finding.payload,
        request_path = finding.request_path,
        token = finding.token,
        source_ip = finding.source_ip,
    );

    report.push_str(&metadata_section(finding));
    report.push_str(&format!(
        "\n## Impact\nAn attacker can:\n{}\n\n## Remediation\n{}\n",
        class.impact(),
        class.remediation()
    ));
    report
}

/// Writes one report per finding into `dir`, named by token.
pub fn write_reports(findings: &[Finding], dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(findings.len());
    for finding in findings {
        let path = dir.join(format!("ricochet_{}_{}.md", finding.token, finding.callback_id));
        std::fs::write(&path, generate_report(finding))?;
        written.push(path);
    }
    Ok(written)
}

fn metadata_section(finding: &Finding) -> String {
    let Some(metadata) = finding.metadata() else {
        return "\n**Note:** No metadata was captured. Consider exfiltration payloads \
                for richer evidence (URL, cookies, DOM).\n"
            .to_string();
    };

    let mut lines = vec!["\n## Captured Metadata".to_string()];
    if let Some(url) = metadata.get("url").and_then(|v| v.as_str()) {
        lines.push(format!("- **Execution URL:** `{url}`"));
    }
    match metadata.get("cookies").and_then(|v| v.as_str()) {
        Some(cookies) if !cookies.is_empty() => {
            let shown: String = cookies.chars().take(200).collect();
            lines.push(format!("- **Cookies:** `{shown}`"));
        }
        Some(_) => {
            lines.push("- **Cookies:** None (HttpOnly flag likely set)".to_string());
        }
        None => {}
    }
    if let Some(ua) = metadata.get("ua").and_then(|v| v.as_str()) {
        lines.push(format!("- **User-Agent:** `{ua}`"));
    }
    if let Some(dom) = metadata.get("dom").and_then(|v| v.as_str()) {
        let shown: String = dom.chars().take(500).collect();
        lines.push(format!("- **DOM Snippet:**\n  ```html\n  {shown}\n  ```"));
    }
    lines.push(String::new());
    lines.join("\n")
}

fn infer_execution_context(finding: &Finding) -> String {
    if let Some(metadata) = finding.metadata() {
        if let Some(url) = metadata.get("url").and_then(|v| v.as_str()) {
            let lower = url.to_lowercase();
            if lower.contains("/admin") {
                return "an admin panel".to_string();
            }
            if lower.contains("/dashboard") || lower.contains("/panel") {
                return "an administrative dashboard".to_string();
            }
            if lower.contains("/moderate") || lower.contains("/review") {
                return "a moderation queue".to_string();
            }
            return format!("the application context ({url})");
        }
    }

    let delay = finding.delay_seconds();
    if delay > 3600.0 {
        "a likely admin/moderation queue (long delay)".to_string()
    } else if delay > 300.0 {
        "background processing or a review queue".to_string()
    } else {
        "an unknown context (possibly user-triggered or a background job)".to_string()
    }
}
