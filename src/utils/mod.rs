use chrono::{DateTime, Locale, Utc};

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Thresholds are checked in order, first match wins. A future timestamp
/// yields a negative elapsed value and therefore "Just now".
pub fn format_relative_time(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };

    let minutes = now.signed_duration_since(parsed.with_timezone(&Utc)).num_minutes();
    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return format!("{} دقيقة مضت", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{} ساعة مضت", hours);
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{} يوم مضى", days);
    }
    parsed
        .with_timezone(&Utc)
        .format_localized("%d %B %Y", Locale::ar_SA)
        .to_string()
}

pub fn format_relative_time_now(timestamp: &str) -> String {
    format_relative_time(timestamp, Utc::now())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityStyle {
    pub color: &'static str,
    pub gradient: &'static str,
}

const DEFAULT_STYLE: ActivityStyle = ActivityStyle {
    color: "purple",
    gradient: "from-purple-500 to-pink-600",
};

/// Unrecognized tags fall back to the purple default.
pub fn activity_style(kind: &str) -> ActivityStyle {
    match kind {
        "order_created" => ActivityStyle {
            color: "blue",
            gradient: "from-blue-500 to-cyan-600",
        },
        "order_updated" => ActivityStyle {
            color: "amber",
            gradient: "from-amber-500 to-orange-600",
        },
        "order_completed" => ActivityStyle {
            color: "green",
            gradient: "from-green-500 to-emerald-600",
        },
        "payment_received" => ActivityStyle {
            color: "emerald",
            gradient: "from-emerald-500 to-teal-600",
        },
        "ticket_opened" => ActivityStyle {
            color: "red",
            gradient: "from-red-500 to-rose-600",
        },
        "ticket_resolved" => ActivityStyle {
            color: "indigo",
            gradient: "from-indigo-500 to-blue-600",
        },
        _ => DEFAULT_STYLE,
    }
}
