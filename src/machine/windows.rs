use std::process::Command;

/// Collect `label=value` identifiers on Windows.
pub fn collect_identifiers() -> Vec<String> {
    let mut ids = Vec::new();

    if let Some(uuid) = wmic_value(&["csproduct", "get", "UUID"]) {
        ids.push(format!("product-uuid={uuid}"));
    }
    if let Some(serial) = wmic_value(&["baseboard", "get", "SerialNumber"]) {
        ids.push(format!("board-serial={serial}"));
    }
    if let Some(serial) = system_volume_serial() {
        ids.push(format!("volume-serial={serial}"));
    }

    ids
}

/// Second line of `wmic <class> get <property>` output.
fn wmic_value(args: &[&str]) -> Option<String> {
    let output = Command::new("wmic").args(args).output().ok()?;
    let result = String::from_utf8_lossy(&output.stdout);
    result
        .lines()
        .nth(1)
        .map(|line| line.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Serial of the system volume from `vol C:`.
fn system_volume_serial() -> Option<String> {
    let output = Command::new("cmd").args(["/C", "vol", "C:"]).output().ok()?;
    let result = String::from_utf8_lossy(&output.stdout);
    result
        .lines()
        .find(|line| line.contains("Serial Number"))
        .and_then(|line| line.split_whitespace().last())
        .map(|serial| serial.to_string())
}
