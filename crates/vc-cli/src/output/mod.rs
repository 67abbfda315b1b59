//! Output formatting utilities for the CLI
//!
//! Tables for forwards, models and sessions, plus colored status messages.

use tabled::{settings::Style, Table, Tabled};

use vc_forward::health::ForwardSession;
use vc_forward::listing::{CleanedSession, LocalModel, RemoteModel, SessionForward};
use vc_forward::launch::LaunchReport;
use vc_forward::{ForwardOutcome, ServiceState};

const NONE: &str = "-";

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| NONE.to_string())
}

/// Format the outcomes of one reconciliation pass
pub fn format_outcomes(outcomes: &[ForwardOutcome]) -> String {
    if outcomes.is_empty() {
        return "Nothing to do".to_string();
    }

    #[derive(Tabled)]
    struct OutcomeRow {
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "REMOTE PORT")]
        remote_port: u16,
        #[tabled(rename = "LOCAL PORT")]
        local_port: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "MODEL")]
        model: String,
    }

    let rows: Vec<OutcomeRow> = outcomes
        .iter()
        .map(|o| OutcomeRow {
            host: o.host.clone(),
            remote_port: o.remote_port,
            local_port: or_dash(o.local_port),
            status: o.status.to_string(),
            model: or_dash(o.model.as_ref()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format models answering on local ports
pub fn format_local_models(models: &[LocalModel]) -> String {
    if models.is_empty() {
        return "No local models found".to_string();
    }

    #[derive(Tabled)]
    struct LocalRow {
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "MODEL")]
        model: String,
        #[tabled(rename = "SERVER")]
        server: String,
        #[tabled(rename = "REMOTE PORT")]
        remote_port: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "TMUX SESSION")]
        session: String,
    }

    let rows: Vec<LocalRow> = models
        .iter()
        .map(|m| {
            let origin = m.origin.as_ref();
            LocalRow {
                port: m.port,
                model: m.model.to_string(),
                server: or_dash(origin.and_then(|o| o.host.as_deref())),
                remote_port: or_dash(origin.map(|o| o.remote_port)),
                pid: or_dash(origin.and_then(|o| o.pid)),
                session: or_dash(origin.and_then(|o| o.session.as_deref())),
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format remote probe results; without `debug` only serving hosts are shown
pub fn format_remote_models(models: &[RemoteModel], debug: bool) -> String {
    #[derive(Tabled)]
    struct RemoteRow {
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "MODEL")]
        model: String,
    }

    let rows: Vec<RemoteRow> = models
        .iter()
        .filter_map(|m| {
            let model = match &m.state {
                ServiceState::Serving(model) => model.to_string(),
                ServiceState::Absent if debug => "(no model)".to_string(),
                ServiceState::Unreachable(e) if debug => format!("(error: {})", e),
                _ => return None,
            };
            Some(RemoteRow {
                host: m.endpoint.host.clone(),
                port: m.endpoint.remote_port,
                model,
            })
        })
        .collect();

    if rows.is_empty() {
        return "No remote models found".to_string();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format checked forwards
pub fn format_forward_sessions(sessions: &[ForwardSession]) -> String {
    if sessions.is_empty() {
        return "No active forwards".to_string();
    }

    #[derive(Tabled)]
    struct HealthRow {
        #[tabled(rename = "LOCAL PORT")]
        local_port: u16,
        #[tabled(rename = "SERVER")]
        server: String,
        #[tabled(rename = "REMOTE PORT")]
        remote_port: u16,
        #[tabled(rename = "MODEL")]
        model: String,
        #[tabled(rename = "ALIVE")]
        alive: String,
        #[tabled(rename = "REASON")]
        reason: String,
    }

    let rows: Vec<HealthRow> = sessions
        .iter()
        .map(|s| HealthRow {
            local_port: s.local_port,
            server: or_dash(s.server.as_deref()),
            remote_port: s.remote_port,
            model: or_dash(s.model_name.as_ref()),
            alive: if s.alive { "yes" } else { "no" }.to_string(),
            reason: or_dash(s.reason.as_deref()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format tunnel sessions with what they forward
pub fn format_session_forwards(forwards: &[SessionForward]) -> String {
    if forwards.is_empty() {
        return "No tunnel sessions".to_string();
    }

    #[derive(Tabled)]
    struct SessionRow {
        #[tabled(rename = "SESSION")]
        session: String,
        #[tabled(rename = "LOCAL PORT")]
        local_port: String,
        #[tabled(rename = "SERVER")]
        server: String,
        #[tabled(rename = "REMOTE PORT")]
        remote_port: String,
        #[tabled(rename = "MODEL")]
        model: String,
    }

    let rows: Vec<SessionRow> = forwards
        .iter()
        .map(|f| {
            let tunnel = f.tunnel.as_ref();
            SessionRow {
                session: f.session.clone(),
                local_port: or_dash(tunnel.map(|t| t.local_port)),
                server: or_dash(tunnel.and_then(|t| t.host.as_deref())),
                remote_port: or_dash(tunnel.map(|t| t.remote_port)),
                model: or_dash(f.model.as_ref()),
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the sessions removed by a cleanup
pub fn format_cleaned(cleaned: &[CleanedSession]) -> String {
    if cleaned.is_empty() {
        return "No broken tunnel sessions".to_string();
    }

    #[derive(Tabled)]
    struct CleanedRow {
        #[tabled(rename = "SESSION")]
        session: String,
        #[tabled(rename = "REASON")]
        reason: String,
        #[tabled(rename = "RESULT")]
        result: String,
    }

    let rows: Vec<CleanedRow> = cleaned
        .iter()
        .map(|c| CleanedRow {
            session: c.session.clone(),
            reason: c.reason.to_string(),
            result: match &c.error {
                None => "killed".to_string(),
                Some(e) => format!("kill failed: {}", e),
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a launch report as `key: value` lines
pub fn format_launch(report: &LaunchReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("Server: {}\n", report.endpoint));
    output.push_str(&format!("Local port: {}\n", report.local_port));
    output.push_str(&format!("Tunnel session: {}\n", report.tunnel_session));
    output.push_str(&format!(
        "Remote session: {} on {}\n",
        report.service_session, report.endpoint.host
    ));
    output.push_str(&format!("Model: {}\n", or_dash(report.model.as_ref())));
    output
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
///
/// Outputs to stderr.
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
