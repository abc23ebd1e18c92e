//! Text rendering shared by the outbound channels.

use fleetflow_core::types::{Notification, Priority};

/// Single SMS segment.
pub const SMS_MAX_CHARS: usize = 160;

/// Email subject, tagged when the priority is above normal.
pub fn subject(n: &Notification) -> String {
    if n.priority > Priority::Normal {
        format!("[{}] {}", n.priority.to_string().to_uppercase(), n.title)
    } else {
        n.title.clone()
    }
}

/// Plain-text body for email.
pub fn plain_text(n: &Notification) -> String {
    let mut body = format!("{}\n\n{}\n", n.title, n.message);
    if let Some(value) = n.value {
        body.push_str(&format!("\nEstimated value: ${value:.2}"));
    }
    if let Some(url) = n.metadata.get("url").and_then(|v| v.as_str()) {
        body.push_str(&format!("\nLink: {url}"));
    }
    body.push_str(&format!(
        "\nType: {} | Priority: {} | Sent: {}\n",
        n.kind,
        n.priority,
        n.timestamp.format("%Y-%m-%d %H:%M UTC")
    ));
    body
}

/// One-segment SMS text, cut on a char boundary.
pub fn sms_text(n: &Notification) -> String {
    let full = format!("FleetFlow: {} - {}", n.title, n.message);
    if full.chars().count() <= SMS_MAX_CHARS {
        return full;
    }
    let mut cut: String = full.chars().take(SMS_MAX_CHARS - 3).collect();
    cut.push_str("...");
    cut
}
