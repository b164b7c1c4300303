//! Timestamps and identifiers for records and audit events.

use serde_json::Value as JsonValue;
use ulid::Ulid;

/// Unix-epoch seconds with a `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

/// Seconds part of an epoch-Z stamp; `None` for anything else.
pub fn parse_epoch_z(stamp: &str) -> Option<u64> {
    stamp.strip_suffix('Z')?.parse().ok()
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Response envelope printed by `--format json` CLI commands.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "ts": now_epoch_z(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_z_parses_back() {
        let stamp = now_epoch_z();
        assert!(stamp.ends_with('Z'));
        assert!(parse_epoch_z(&stamp).is_some());
        assert_eq!(parse_epoch_z("12Z"), Some(12));
        assert_eq!(parse_epoch_z("12"), None);
    }

    #[test]
    fn record_ids_are_distinct_ulids() {
        let a = new_event_id();
        let b = new_event_id();
        assert_ne!(a, b);
        assert!(Ulid::from_string(&a).is_ok());
    }

    #[test]
    fn envelope_merges_extra_fields() {
        let envelope = command_envelope("record.create", "ok", serde_json::json!({"id": "x"}));
        assert_eq!(envelope["cmd"], "record.create");
        assert_eq!(envelope["status"], "ok");
        assert_eq!(envelope["id"], "x");
        assert!(envelope["ts"].is_string());
    }
}
