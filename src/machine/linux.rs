use std::fs;
use std::path::Path;

/// Collect `label=value` identifiers on Linux.
pub fn collect_identifiers() -> Vec<String> {
    let mut ids = Vec::new();

    if let Some(id) =
        read_trimmed("/etc/machine-id").or_else(|| read_trimmed("/var/lib/dbus/machine-id"))
    {
        ids.push(format!("machine-id={id}"));
    }
    // DMI entries are frequently root-only; missing ones are simply skipped.
    if let Some(uuid) = read_trimmed("/sys/class/dmi/id/product_uuid") {
        ids.push(format!("product-uuid={uuid}"));
    }
    if let Some(serial) = read_trimmed("/sys/class/dmi/id/board_serial") {
        ids.push(format!("board-serial={serial}"));
    }
    if let Some(mac) = primary_mac_address() {
        ids.push(format!("mac={mac}"));
    }

    ids
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Hardware address of the first physical, non-loopback adapter by name.
fn primary_mac_address() -> Option<String> {
    let mut names: Vec<String> = fs::read_dir("/sys/class/net")
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "lo")
        .filter(|name| !Path::new("/sys/devices/virtual/net").join(name).exists())
        .collect();
    names.sort();

    names.iter().find_map(|name| {
        read_trimmed(&format!("/sys/class/net/{name}/address"))
            .filter(|mac| mac != "00:00:00:00:00:00")
    })
}
