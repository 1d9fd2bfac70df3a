//! Human-readable error descriptions and structured JSON error formatting.

use crate::run::{RunError, run_error_name};
use actuator_core::error::{ActuatorError, BuildError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No actuator driver was provided.\nLikely causes: The simulation profile failed to initialize.\nHow to fix: Check [simulation] in the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RunError>() {
        return match re {
            RunError::Timeout { waited_ms } => format!(
                "What happened: The actuator did not finish within {waited_ms} ms.\nLikely causes: Timeout too short, a limit switch or soft limit in the way, or a stall cut the output.\nHow to fix: Raise --timeout-ms or check the limits and stall settings."
            ),
            RunError::Canceled => "What happened: The command was rejected before completion.\nLikely causes: The target lies beyond a soft limit, or an active limit switch blocks that direction.\nHow to fix: Pick a target inside [soft_limits] or move off the switch first.".to_string(),
            RunError::Interrupted => "What happened: Interrupted by Ctrl-C; the actuator was stopped.".to_string(),
            RunError::NoPreset(side) => format!(
                "What happened: There is no preset {side} the current position.\nHow to fix: Use --index, or move the other way."
            ),
        };
    }

    if let Some(ae) = err.downcast_ref::<ActuatorError>() {
        return match ae {
            ActuatorError::Unsupported(what) => format!(
                "What happened: The actuator does not support {what}.\nLikely causes: The servo profile has no native loops and software PID is off.\nHow to fix: Set actuator.software_pid = true and add the matching [pid.*] gains."
            ),
            ActuatorError::MisconfiguredController(mode) => format!(
                "What happened: Software {mode} control has no gains.\nHow to fix: Add [pid.{mode}] to the config."
            ),
            ActuatorError::OwnershipDenied { owner } => format!(
                "What happened: Ownership denied for {}.\nLikely causes: Another owner holds the actuator.\nHow to fix: Use the same --owner or wait until the holder finishes.",
                owner.as_deref().unwrap_or("anonymous caller")
            ),
            ActuatorError::InvalidPreset(i) => format!(
                "What happened: There is no preset at index {i}.\nHow to fix: Run self-check to list the configured presets."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!(
            "What happened: The config file is not valid TOML for this tool.\nDetails: {}\nHow to fix: Compare it with etc/actuator.toml.",
            te.message()
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("presets csv must have") {
        return "Invalid headers in presets CSV. Expected a single 'position' column.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nHow to fix: Pass an existing file with --config. Original: {msg}"
        );
    }

    if lower.contains("must be") || lower.contains("requires") || lower.contains("needs") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for run outcomes; every other error returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<RunError>() {
        Some(RunError::Interrupted) => 130,
        Some(RunError::Timeout { .. }) => 3,
        Some(RunError::Canceled) => 4,
        Some(RunError::NoPreset(_)) => 5,
        None if err.downcast_ref::<ActuatorError>().is_some_and(|e| {
            matches!(e, ActuatorError::OwnershipDenied { .. })
        }) =>
        {
            6
        }
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match (err.downcast_ref::<RunError>(), err.downcast_ref::<ActuatorError>()) {
        (Some(re), _) => run_error_name(re),
        (None, Some(ActuatorError::OwnershipDenied { .. })) => "OwnershipDenied",
        (None, Some(ActuatorError::Unsupported(_))) => "Unsupported",
        (None, Some(_)) => "Actuator",
        (None, None) => "Error",
    };
    let mut obj = json!({ "reason": reason, "message": humanize(err) });
    if let Some(RunError::Timeout { waited_ms }) = err.downcast_ref::<RunError>() {
        obj["details"] = json!({ "waited_ms": waited_ms });
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_errors_get_distinct_codes() {
        let t = eyre::Report::new(RunError::Timeout { waited_ms: 10 });
        let c = eyre::Report::new(RunError::Canceled);
        assert_eq!(exit_code_for_error(&t), 3);
        assert_eq!(exit_code_for_error(&c), 4);
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn timeout_json_carries_details() {
        let t = eyre::Report::new(RunError::Timeout { waited_ms: 250 });
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&t)).unwrap();
        assert_eq!(v["reason"], "Timeout");
        assert_eq!(v["details"]["waited_ms"], 250);
    }

    #[test]
    fn ownership_denied_is_explained() {
        let e = eyre::Report::new(ActuatorError::OwnershipDenied {
            owner: Some("arm".into()),
        });
        assert!(humanize(&e).contains("arm"));
        assert_eq!(exit_code_for_error(&e), 6);
    }
}
