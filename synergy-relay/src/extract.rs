use crate::models::SwitchEvent;
use chrono::{Local, SecondsFormat};
use once_cell::sync::Lazy;
use regex::Regex;

// Synergy logs `switch from "a" to "b-host" ...`; the name ends at the first '-'
static SWITCH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"to "([^-]+)"#).expect("switch pattern is valid"));

/// Desktop name of a switch line, `None` for any other line.
pub fn extract_desktop(line: &str) -> Option<&str> {
    SWITCH_PATTERN
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Switch event stamped with the current local time.
pub fn extract_switch_event(line: &str) -> Option<SwitchEvent> {
    extract_desktop(line).map(|desktop| SwitchEvent {
        desktop: desktop.to_string(),
        timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_line() {
        assert_eq!(extract_desktop(r#"switched to "desktop1-"#), Some("desktop1"));
        let event = extract_switch_event(r#"switched to "desktop1-"#).unwrap();
        assert_eq!(event.desktop, "desktop1");
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[test]
    fn test_synergy_log_line() {
        let line = r#"[2025-01-28T10:15:02] INFO: switch from "laptop" to "office-pc" at 1919,540"#;
        assert_eq!(extract_desktop(line), Some("office"));
    }

    #[test]
    fn test_no_marker() {
        assert_eq!(extract_desktop("log line without match"), None);
        assert!(extract_switch_event("").is_none());
        assert!(extract_switch_event(r#"went to desktop1-"#).is_none());
    }

    #[test]
    fn test_name_runs_to_dash() {
        // no dash: everything after the marker is the name
        assert_eq!(extract_desktop(r#"switched to "desk""#), Some(r#"desk""#));
        // dash right after the quote: nothing to capture
        assert_eq!(extract_desktop(r#"switched to "-desk"#), None);
    }
}
