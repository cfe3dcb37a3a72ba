const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Render a byte count with base-1024 units and at most two decimals
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{:.2}", value);
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, UNITS[unit])
}
