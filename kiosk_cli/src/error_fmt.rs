//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use kiosk_core::error::BuildError;

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::EmptyName => {
                "What happened: A kiosk component has an empty name.\nLikely causes: A `name = \"\"` entry in one of the config sections.\nHow to fix: Give every [coin_slot], [relay], [[counter]], [[hopper]] and [[paper]] entry a non-empty name.".to_string()
            }
            BuildError::DuplicateInstance { family, name } => format!(
                "What happened: Two {family} instances are both named '{name}'.\nLikely causes: A copied config section that kept its name.\nHow to fix: Rename one of them; names address instances in host commands."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: No component sections, or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/kiosk.toml for a sample."
            ),
        };
    }

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    if let Some(hw) = err.downcast_ref::<kiosk_hardware::error::HwError>() {
        return format!(
            "What happened: GPIO initialization failed ({hw}).\nLikely causes: Incorrect pin numbers, a pin already claimed by another process, or insufficient GPIO permissions.\nHow to fix: Check the pin values in the config and make sure the process may access /dev/gpiomem."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read ({msg}).\nLikely causes: Wrong --config path or missing file permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML file (default: etc/kiosk.toml)."
        );
    }

    if lower.contains("invalid configuration") {
        let cause = err
            .chain()
            .skip(1)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ");
        let cause = if cause.is_empty() { msg.clone() } else { cause };
        return format!(
            "What happened: Configuration is invalid or incomplete ({cause}).\nLikely causes: Missing required keys (name, pins), duplicate names, zero timings, or a counter relay outside the relay bank.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Denomination CSV header special-case
    if lower.contains("denomination csv must have headers") {
        return "Invalid headers in denomination CSV. Expected 'pulses,value'.".to_string();
    }

    if lower.contains("kiosk_sim_coins") {
        return format!(
            "What happened: {msg}.\nHow to fix: Set KIOSK_SIM_COINS to pulse counts such as 1,3,6 or unset it."
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

/// Stable exit codes: 2 config, 3 assembly, 4 hardware, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use kiosk_core::error::BuildError;

    if err.downcast_ref::<BuildError>().is_some() {
        return 3;
    }
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    if err.downcast_ref::<kiosk_hardware::error::HwError>().is_some() {
        return 4;
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.contains("invalid configuration")
        || lower.contains("read config")
        || lower.contains("denomination csv")
    {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match exit_code_for_error(err) {
        2 => "Config",
        3 => "Build",
        4 => "Hardware",
        _ => "Error",
    };
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
