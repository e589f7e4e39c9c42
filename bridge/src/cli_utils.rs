pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds else {
        return "N/A".to_string();
    };
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{seconds:.0}s")
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor() as i64;
        let secs = (seconds % 60.0).floor() as i64;
        format!("{minutes}m {secs}s")
    } else {
        let hours = (seconds / 3600.0).floor() as i64;
        let minutes = ((seconds % 3600.0) / 60.0).floor() as i64;
        format!("{hours}h {minutes}m")
    }
}

pub fn truncate(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        return value.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let head: String = value.chars().take(keep).collect();
    format!("{head}...")
}

pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn join_names<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| name.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}
