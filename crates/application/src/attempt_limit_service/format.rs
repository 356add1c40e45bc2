use chrono::Duration;

/// Formats a retry delay as human-readable text.
///
/// Returns `"<n> minute(s) <n> second(s)"` when at least one minute remains,
/// `"<n> second(s)"` below a minute, and the empty string when nothing
/// remains. Sub-second remainders round up, so a positive delay never
/// formats as empty.
pub(crate) fn format_retry_delay(delay: Duration) -> String {
    let millis = delay.num_milliseconds();
    if millis <= 0 {
        return String::new();
    }

    // `i64::div_ceil` is unstable on this toolchain; `millis` is positive
    // here, so the unsigned equivalent produces the same result.
    let total_seconds = (millis as u64).div_ceil(1000) as i64;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes >= 1 {
        format!(
            "{minutes} {} {seconds} {}",
            pluralize(minutes, "minute"),
            pluralize(seconds, "second")
        )
    } else {
        format!("{seconds} {}", pluralize(seconds, "second"))
    }
}

fn pluralize(count: i64, unit: &str) -> String {
    if count == 1 {
        unit.to_owned()
    } else {
        format!("{unit}s")
    }
}
