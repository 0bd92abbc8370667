//! Structured fast path: `inxi` JSON output

use serde_json::Value;

use crate::model::HardwareSnapshot;
use crate::normalize::{
    clean, commercial_disk_size, describe_ram, disk_type_from_name, kernel_major_minor,
    ram_type_from_text,
};

/// Command producing the JSON report
pub const INXI_COMMAND: &str = "inxi -FzJc0";

/// inxi reports drive sizes in GiB
const GB_PER_GIB: f64 = 1.073_741_824;

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(clean)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("n/a"))
}

fn number(value: &Value, key: &str) -> Option<f64> {
    let field = value.get(key)?;
    field
        .as_f64()
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n| *n > 0.0)
}

fn first(value: &Value, key: &str) -> Option<Value> {
    match value.get(key)? {
        Value::Array(items) => items.first().cloned(),
        other @ Value::Object(_) => Some(other.clone()),
        _ => None,
    }
}

/// Parse an inxi JSON report.
///
/// Returns `None` unless both the processor and the memory size resolve;
/// other missing fields stay at the placeholder.
pub fn parse(output: &str) -> Option<HardwareSnapshot> {
    let data: Value = serde_json::from_str(output.trim()).ok()?;
    let mut snapshot = HardwareSnapshot::default();

    let cpu = first(&data, "cpu")?;
    snapshot.processor = text(&cpu, "model")?;
    if let (Some(cores), Some(threads)) = (number(&cpu, "cores"), number(&cpu, "threads")) {
        snapshot.cores_threads = format!("{cores:.0}/{threads:.0}");
    }

    let memory = data.get("memory")?;
    let ram_type = first(memory, "arrays")
        .and_then(|array| array.get("devices").cloned())
        .and_then(|devices| match devices {
            Value::Array(items) => items.iter().find_map(|device| {
                device
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(ram_type_from_text)
            }),
            _ => None,
        });
    snapshot.ram = describe_ram(number(memory, "total-gb")?, ram_type)?;

    if let Some(machine) = data.get("machine") {
        if let Some(mobo) = text(machine, "mobo") {
            snapshot.motherboard = match text(machine, "mobo-model") {
                Some(model) => format!("{mobo} - {model}"),
                None => mobo,
            };
        }
    }

    if let Some(drive) = first(&data, "drives") {
        let name = text(&drive, "name").unwrap_or_default();
        let ssd = drive.get("is-ssd").and_then(Value::as_bool).unwrap_or(false);
        snapshot.disk_type = disk_type_from_name(&name)
            .unwrap_or(if ssd { "SSD" } else { "HDD" })
            .to_string();
        if let Some(capacity) = number(&drive, "size-gb")
            .map(|gib| gib * GB_PER_GIB)
            .and_then(commercial_disk_size)
        {
            snapshot.disk_capacity = capacity;
        }
    }

    if let Some(system) = data.get("system") {
        if let Some(distro) = text(system, "distro") {
            snapshot.os_release = distro;
        }
        if let Some(kernel) = text(system, "kernel")
            .and_then(|k| k.split(' ').next().and_then(kernel_major_minor))
        {
            snapshot.kernel = kernel;
        }
    }

    Some(snapshot)
}
