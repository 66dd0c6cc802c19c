//! Trigger request — the immutable snapshot of one invocation, built
//! once from the opaque event descriptor and owned by the pipeline run.

use serde_json::{Map, Value};

use super::origin;

/// Action tag marking an externally requested run.
pub const ACTION_RUN_SCRIPT: &str = "shotscript.run";

/// Opaque trigger descriptor as delivered by an entry point (CLI, IPC,
/// shortcut). All fields optional; defaults are applied at snapshot time.
#[derive(Debug, Clone, Default)]
pub struct TriggerEvent {
    pub action: Option<String>,
    pub script_name: Option<String>,
    pub silent: Option<bool>,
    pub suppress_feedback: Option<bool>,
    pub skip_capture: Option<bool>,
    pub origin: Option<String>,
    pub extras: Map<String, Value>,
}

/// Immutable per-invocation snapshot. Never mutated after construction;
/// never outlives the pipeline run it started.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    action: Option<String>,
    silent: bool,
    suppress_feedback: bool,
    skip_capture: bool,
    override_script: Option<String>,
    origin: String,
    extras: Map<String, Value>,
}

impl TriggerRequest {
    pub fn from_event(event: TriggerEvent) -> Self {
        let origin = match event.origin {
            Some(origin) if !origin.is_empty() => origin,
            _ => {
                if event.action.as_deref() == Some(ACTION_RUN_SCRIPT) {
                    origin::THIRD_PARTY.to_string()
                } else {
                    origin::APP.to_string()
                }
            }
        };
        let override_script = event
            .script_name
            .filter(|name| !name.trim().is_empty());
        Self {
            action: event.action,
            silent: event.silent.unwrap_or(true),
            suppress_feedback: event.suppress_feedback.unwrap_or(false),
            skip_capture: event.skip_capture.unwrap_or(false),
            override_script,
            origin,
            extras: event.extras,
        }
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn suppress_feedback(&self) -> bool {
        self.suppress_feedback
    }

    pub fn skip_capture(&self) -> bool {
        self.skip_capture
    }

    pub fn override_script(&self) -> Option<&str> {
        self.override_script.as_deref()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }
}

/// Filter an extras map down to script-safe values: scalars
/// (string/bool/number, floats are doubles already in JSON) and
/// homogeneous lists of one scalar kind. Everything else is dropped
/// rather than surfaced as a binding error.
pub fn coerce_extras(extras: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in extras {
        if let Some(coerced) = coerce_value(value) {
            out.insert(key.clone(), coerced);
        } else {
            log::debug!("[FLOW] Dropping unsupported extra '{}'", key);
        }
    }
    out
}

fn coerce_value(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) | Value::Bool(_) | Value::Number(_) => Some(value.clone()),
        Value::Array(items) => {
            if items.is_empty() {
                return Some(value.clone());
            }
            let homogeneous = items.iter().all(|v| scalar_kind(v) == scalar_kind(&items[0]))
                && scalar_kind(&items[0]).is_some();
            homogeneous.then(|| value.clone())
        }
        _ => None,
    }
}

fn scalar_kind(value: &Value) -> Option<u8> {
    match value {
        Value::String(_) => Some(0),
        Value::Bool(_) => Some(1),
        Value::Number(_) => Some(2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_applied_at_snapshot_time() {
        let request = TriggerRequest::from_event(TriggerEvent::default());
        assert!(request.is_silent());
        assert!(!request.suppress_feedback());
        assert!(!request.skip_capture());
        assert_eq!(request.origin(), origin::APP);
        assert!(request.override_script().is_none());
    }

    #[test]
    fn origin_derived_from_external_action() {
        let request = TriggerRequest::from_event(TriggerEvent {
            action: Some(ACTION_RUN_SCRIPT.to_string()),
            ..Default::default()
        });
        assert_eq!(request.origin(), origin::THIRD_PARTY);
    }

    #[test]
    fn explicit_origin_wins_over_derivation() {
        let request = TriggerRequest::from_event(TriggerEvent {
            action: Some(ACTION_RUN_SCRIPT.to_string()),
            origin: Some(origin::SHORTCUT_CAPTURE.to_string()),
            ..Default::default()
        });
        assert_eq!(request.origin(), origin::SHORTCUT_CAPTURE);
    }

    #[test]
    fn blank_script_override_is_ignored() {
        let request = TriggerRequest::from_event(TriggerEvent {
            script_name: Some("   ".to_string()),
            ..Default::default()
        });
        assert!(request.override_script().is_none());
    }

    #[test]
    fn extras_coercion_drops_unsupported_types() {
        let mut extras = Map::new();
        extras.insert("label".into(), json!("hello"));
        extras.insert("flag".into(), json!(true));
        extras.insert("count".into(), json!(42));
        extras.insert("ratio".into(), json!(0.5));
        extras.insert("nested".into(), json!({"inner": 1}));
        extras.insert("tags".into(), json!(["a", "b"]));
        extras.insert("mixed".into(), json!(["a", 1]));

        let coerced = coerce_extras(&extras);
        assert_eq!(coerced.get("label"), Some(&json!("hello")));
        assert_eq!(coerced.get("flag"), Some(&json!(true)));
        assert_eq!(coerced.get("count"), Some(&json!(42)));
        assert_eq!(coerced.get("ratio"), Some(&json!(0.5)));
        assert_eq!(coerced.get("tags"), Some(&json!(["a", "b"])));
        assert!(coerced.get("nested").is_none());
        assert!(coerced.get("mixed").is_none());
    }
}
