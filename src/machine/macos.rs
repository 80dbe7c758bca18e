use std::process::Command;

/// Collect `label=value` identifiers on macOS.
///
/// Uses `ioreg -rd1 -c IOPlatformExpertDevice` for the platform UUID and the
/// serial number.
pub fn collect_identifiers() -> Vec<String> {
    let output = match Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
    {
        Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
        Err(_) => return Vec::new(),
    };

    let mut ids = Vec::new();
    if let Some(uuid) = ioreg_value(&output, "IOPlatformUUID") {
        ids.push(format!("platform-uuid={uuid}"));
    }
    if let Some(serial) = ioreg_value(&output, "IOPlatformSerialNumber") {
        ids.push(format!("serial={serial}"));
    }
    ids
}

/// Extract `"Key" = "Value"` from ioreg output.
fn ioreg_value(output: &str, key: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains(key))
        .and_then(|line| line.split('"').nth(3))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
