//! Human-readable error descriptions, exit codes and structured JSON errors.

use scalelink_config::ScaleSetError;
use scalelink_core::{BuildError, ProbeError, RemoteError};
use serde_json::json;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(re) = err.downcast_ref::<RemoteError>() {
        return match re {
            RemoteError::Timeout => "What happened: The server did not answer in time.\nLikely causes: Slow or unreachable network, or the server is overloaded.\nHow to fix: Check connectivity to station.server_url and try again.".to_string(),
            RemoteError::RateLimited => "What happened: The server is rate limiting this station (HTTP 429).\nLikely causes: Too many requests in a short time.\nHow to fix: Wait a few seconds, or raise tuning.api_sync_interval_ms.".to_string(),
            RemoteError::Status { status: 401 | 403, message } => format!(
                "What happened: The server rejected the credentials ({}).\nLikely causes: Wrong or expired station.bearer_token, or an unregistered station.\nHow to fix: Update the token in the config or run `scalelink register --write`.",
                message.as_deref().unwrap_or("unauthorized")
            ),
            RemoteError::Status { status, message } => format!(
                "What happened: The server answered HTTP {status}{}.\nLikely causes: Server-side error or an unexpected request.\nHow to fix: Check the server logs; re-run with --log-level=debug for details.",
                message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
            ),
            RemoteError::Transport(msg) => format!(
                "What happened: Could not reach the server ({msg}).\nLikely causes: Wrong station.server_url, no network, or TLS problems.\nHow to fix: Verify the URL and that the server is running."
            ),
            RemoteError::Decode(msg) => format!(
                "What happened: The server sent an unexpected response ({msg}).\nLikely causes: station.server_url points at something that is not the scale API.\nHow to fix: Verify the URL and server version."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<ScaleSetError>() {
        return format!(
            "What happened: {se}.\nLikely causes: The station file already describes this scale or port, or the id is misspelled.\nHow to fix: Run `scalelink status` to see the configured scales."
        );
    }

    if let Some(pe) = err.downcast_ref::<ProbeError>() {
        let hint = match pe {
            ProbeError::Open(_) => "Check the port path and that no other program holds the port.",
            ProbeError::Timeout | ProbeError::Closed => {
                "Check cabling and that the scale is powered; try another profile."
            }
            ProbeError::Unparsable { .. } => "The device answered; try another profile or custom framing.",
            ProbeError::Write(_) | ProbeError::Read(_) => "Reconnect the device and try again.",
        };
        return format!("What happened: Test reading failed: {pe}.\nHow to fix: {hint}");
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: The station could not be assembled ({be}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
        );
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let root = err.root_cause().to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: Could not read the station file.\nLikely causes: Wrong --config path.\nHow to fix: Pass --config or create the file (see etc/scalelink.toml). Original: {root}"
        );
    }

    if lower.starts_with("parse config") {
        return format!(
            "What happened: The station file is not valid TOML for this program.\nLikely causes: Typo in a key or a value of the wrong type.\nHow to fix: Fix the file and try again. Original: {root}"
        );
    }

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid ({root}).\nLikely causes: Missing [station] values, zero intervals, or duplicate scales.\nHow to fix: Edit the TOML config and try again."
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

/// Stable exit codes per error family; everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if err.downcast_ref::<RemoteError>().is_some() {
        return 3;
    }
    if err.downcast_ref::<ScaleSetError>().is_some() {
        return 4;
    }
    if err.downcast_ref::<ProbeError>().is_some() {
        return 5;
    }
    if err.to_string().to_ascii_lowercase().contains("invalid configuration") {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(re) = err.downcast_ref::<RemoteError>() {
        return match re {
            RemoteError::Timeout => "Timeout",
            RemoteError::RateLimited => "RateLimited",
            RemoteError::Status { .. } => "HttpStatus",
            RemoteError::Transport(_) => "Transport",
            RemoteError::Decode(_) => "Decode",
        };
    }
    if err.downcast_ref::<ScaleSetError>().is_some() {
        return "ScaleSet";
    }
    if err.downcast_ref::<ProbeError>().is_some() {
        return "Probe";
    }
    if exit_code_for_error(err) == 2 {
        return "Config";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(RemoteError::Status { status, .. }) = err.downcast_ref::<RemoteError>() {
        obj["status"] = json!(status);
    }
    obj.to_string()
}
