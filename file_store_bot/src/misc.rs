use std::time::Duration;

/// Longest auto-delete delay an admin can set.
pub const MAX_AUTO_DELETE: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Describe a delay in words, like "1 hour 5 minutes".
/// Leaves out seconds once it's longer than an hour, nobody cares at that point.
#[must_use]
pub fn describe_delay(delay: Duration) -> String {
    fn unit(count: u64, name: &str) -> String {
        match count {
            1 => format!("1 {name}"),
            count => format!("{count} {name}s"),
        }
    }

    let total = delay.as_secs();
    let days = total / 86400;
    let hours = total % 86400 / 3600;
    let minutes = total % 3600 / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(unit(days, "day"));
    }
    if hours > 0 {
        parts.push(unit(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(unit(minutes, "minute"));
    }
    if seconds > 0 && total < 3600 {
        parts.push(unit(seconds, "second"));
    }

    if parts.is_empty() {
        return "0 seconds".to_string();
    }

    parts.join(" ")
}

/// Parse an auto-delete delay as given to `/autodelete`: a number of seconds,
/// or `0`/`off` to disable it.
///
/// Returns `None` if it's not valid, and `Some(None)` if it disables auto-deletion.
#[must_use]
pub fn parse_auto_delete(param: &str) -> Option<Option<Duration>> {
    let param = param.trim();
    if param.eq_ignore_ascii_case("off") {
        return Some(None);
    }

    let secs: u64 = param.parse().ok()?;
    if secs == 0 {
        return Some(None);
    }

    let delay = Duration::from_secs(secs);
    if delay > MAX_AUTO_DELETE {
        return None;
    }

    Some(Some(delay))
}
