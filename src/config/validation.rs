//! Configuration validation.

use crate::config::Config;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate the configuration.
///
/// Checks for:
/// - A metrics path that starts with `/`
/// - A known log level
/// - Histogram buckets that are non-empty, finite, positive and strictly increasing
///
/// # Returns
///
/// `Ok(())` if valid, or an error message listing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    let path = &config.metrics.path;
    if !path.starts_with('/') {
        errors.push(format!("metrics path '{}' must start with '/'", path));
    }
    if path.contains('?') || path.contains('#') {
        errors.push(format!(
            "metrics path '{}' must not contain a query or fragment",
            path
        ));
    }

    if !VALID_LOG_LEVELS.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            VALID_LOG_LEVELS.join(", ")
        ));
    }

    let buckets = &config.metrics.duration_buckets;
    if buckets.is_empty() {
        errors.push("at least one duration bucket must be defined".to_string());
    }
    for bucket in buckets {
        if !bucket.is_finite() || *bucket <= 0.0 {
            errors.push(format!(
                "duration bucket {} must be a positive finite number",
                bucket
            ));
        }
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        errors.push("duration buckets must be strictly increasing".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
