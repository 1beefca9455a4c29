//! Terminal rendering for sessions and replies

use chrono::Utc;
use console::{style, Color};
use veritas_agent::ChatSettings;
use veritas_core::session::{AnalysisMetrics, ChatSession, Message, Role, Source, StoreView};
use veritas_core::utils::relative_day_label;

const SHORT_ID_LEN: usize = 8;

pub fn short_id(id: &str) -> &str {
    id.char_indices()
        .nth(SHORT_ID_LEN)
        .map_or(id, |(end, _)| &id[..end])
}

/// `Speed Model · Live Search Active`
pub fn status_line(settings: &ChatSettings) -> String {
    let search = if settings.live_search {
        "Live Search Active"
    } else {
        "Offline Mode"
    };
    format!("{} · {}", settings.model.display_name(), search)
}

pub fn print_status_line(settings: &ChatSettings) {
    println!("{}", style(status_line(settings)).dim());
}

pub fn print_session_list(view: &StoreView) {
    if view.sessions.is_empty() {
        println!("No investigations.");
        return;
    }
    let now = Utc::now();
    for session in &view.sessions {
        let is_current = view.current_session_id.as_deref() == Some(session.id.as_str());
        let marker = if is_current { "*" } else { " " };
        let title = if is_current {
            style(session.title.as_str()).bold()
        } else {
            style(session.title.as_str())
        };
        println!(
            "{} {}  {}  {}  {}",
            style(marker).green(),
            style(short_id(&session.id)).cyan(),
            title,
            style(relative_day_label(session.updated_at, now)).dim(),
            style(format!("{} messages", session.messages.len())).dim(),
        );
    }
}

pub fn print_session(session: &ChatSession) {
    println!(
        "{} {}",
        style(session.title.as_str()).bold().cyan(),
        style(format!("({})", short_id(&session.id))).dim()
    );
    println!(
        "{}",
        style(format!(
            "{} · created {}",
            session.model.display_name(),
            session.created_at.format("%Y-%m-%d %H:%M")
        ))
        .dim()
    );
    println!();
    for message in &session.messages {
        print_message(message);
    }
}

fn print_message(message: &Message) {
    let label = match message.role {
        Role::User => style("You").bold().green(),
        Role::Assistant => style("Veritas").bold().cyan(),
        Role::System => style("System").dim(),
    };
    let time = message.timestamp.format("%H:%M");
    println!("{} {}", label, style(time).dim());
    if message.is_loading && message.content.is_empty() {
        println!("{}", style("Analyzing sources...").dim().italic());
    } else {
        println!("{}", message.content);
    }
    print_reply_footer(message);
    println!();
}

/// Sources and metrics attached to a finished reply
pub fn print_reply_footer(message: &Message) {
    if let Some(sources) = message.grounding_sources.as_deref() {
        print_sources(sources);
    }
    if let Some(metrics) = &message.metrics {
        if let Some(line) = metrics_line(metrics) {
            let color = metrics.confidence_score.map_or(Color::Yellow, confidence_color);
            println!("{}", style(line).fg(color));
        }
    }
}

/// Green above 70, yellow above 40, red otherwise
pub fn confidence_color(score: f64) -> Color {
    if score > 70.0 {
        Color::Green
    } else if score > 40.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        return;
    }
    println!("{}", style("Sources:").bold());
    for (i, source) in sources.iter().enumerate() {
        println!("  [{}] {} {}", i + 1, source.title, style(&source.url).dim());
        if let Some(snippet) = &source.snippet {
            println!("      {}", style(snippet).dim().italic());
        }
    }
}

pub fn metrics_line(metrics: &AnalysisMetrics) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(score) = metrics.confidence_score {
        parts.push(format!("Confidence {}%", score));
    }
    if let Some(score) = metrics.agreement_score {
        parts.push(format!("Agreement {}%", score));
    }
    if let Some(count) = metrics.sources_analyzed {
        parts.push(format!("{} sources analyzed", count));
    }
    if let Some(labels) = metrics.bias_indicators.as_ref().filter(|l| !l.is_empty()) {
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        parts.push(format!("Bias: {}", labels.join(", ")));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" · "))
    }
}
