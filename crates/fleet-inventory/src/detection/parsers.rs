//! Parsers for individual probe outputs
//!
//! Each function takes the trimmed stdout of one command and returns `None`
//! when the output carries nothing usable, so the cascade moves on.

use crate::normalize::{
    clean, disk_gigabytes, disk_type_from_rotational, disk_type_from_throughput,
    kernel_major_minor, parse_quantity, ram_gigabytes, ram_type_from_bios_date,
    ram_type_from_text,
};

/// Board strings firmware vendors leave in unset DMI fields
const PLACEHOLDER_BOARD_VALUES: [&str; 4] = [
    "not spec",
    "empty",
    "to be filled by o.e.m.",
    "default string",
];

/// Memory facts read from `dmidecode -t memory`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryFacts {
    /// Sum of installed module sizes
    pub total_gb: f64,
    /// First explicit generation found
    pub ram_type: Option<&'static str>,
    /// First non-zero module speed
    pub speed_mhz: u32,
}

/// Value after the first `key:` line, matched at line start
fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines()
        .map(str::trim)
        .find_map(|line| {
            let rest = line.strip_prefix(key)?;
            rest.trim_start().strip_prefix(':')
        })
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Same as [`field`], case-insensitive on the key
fn field_ci<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let key = key.to_lowercase();
    text.lines()
        .map(str::trim)
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            (name.trim().to_lowercase() == key).then_some(value.trim())
        })
        .filter(|value| !value.is_empty())
}

fn first_number<T: std::str::FromStr>(text: &str) -> Option<T> {
    text.split_whitespace().next()?.parse().ok()
}

/// `lscpu` model name
pub fn lscpu_model(text: &str) -> Option<String> {
    field(text, "Model name").map(clean)
}

/// `lscpu` topology as `cores/threads`
pub fn lscpu_topology(text: &str) -> Option<String> {
    let per_socket: u32 = first_number(field(text, "Core(s) per socket")?)?;
    let sockets: u32 = first_number(field(text, "Socket(s)")?)?;
    let per_core: u32 = first_number(field(text, "Thread(s) per core")?)?;
    let cores = per_socket * sockets;
    let threads = cores * per_core;
    (cores > 0 && threads > 0).then(|| format!("{cores}/{threads}"))
}

/// `/proc/cpuinfo` model name
pub fn cpuinfo_model(text: &str) -> Option<String> {
    field_ci(text, "model name").map(clean)
}

/// `/proc/cpuinfo` topology: distinct core ids over logical processors
pub fn cpuinfo_topology(text: &str) -> Option<String> {
    let mut threads = 0usize;
    let mut core_ids = std::collections::BTreeSet::new();

    for line in text.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim() {
            "processor" => threads += 1,
            "core id" => {
                core_ids.insert(value.trim().to_string());
            }
            _ => {}
        }
    }

    let cores = if core_ids.is_empty() {
        threads
    } else {
        core_ids.len()
    };
    (cores > 0 && threads > 0).then(|| format!("{cores}/{threads}"))
}

fn usable_board_value(value: &str) -> Option<String> {
    let value = clean(value);
    let lower = value.to_lowercase();
    if value.is_empty() || PLACEHOLDER_BOARD_VALUES.iter().any(|p| lower.contains(p)) {
        None
    } else {
        Some(value)
    }
}

/// Render a board as `vendor - model`, dropping placeholder halves
pub fn join_board(vendor: &str, model: &str) -> Option<String> {
    match (usable_board_value(vendor), usable_board_value(model)) {
        (Some(vendor), Some(model)) => Some(format!("{vendor} - {model}")),
        (Some(one), None) | (None, Some(one)) => Some(one),
        (None, None) => None,
    }
}

/// `dmidecode -t baseboard`
pub fn baseboard(text: &str) -> Option<String> {
    join_board(
        field(text, "Manufacturer").unwrap_or_default(),
        field(text, "Product Name").unwrap_or_default(),
    )
}

/// `cat board_vendor board_name`: vendor on the first line, model on the second
pub fn board_pair(text: &str) -> Option<String> {
    let mut lines = text.lines();
    let vendor = lines.next().unwrap_or_default();
    let model = lines.next().unwrap_or_default();
    join_board(vendor, model)
}

/// `lshw -c motherboard`
pub fn lshw_board(text: &str) -> Option<String> {
    join_board(
        field(text, "vendor").unwrap_or_default(),
        field(text, "product").unwrap_or_default(),
    )
}

/// `dmidecode -t memory`, summing every populated module
pub fn dmi_memory(text: &str) -> Option<MemoryFacts> {
    let mut facts = MemoryFacts::default();

    for block in text.split("Memory Device").skip(1) {
        if block.contains("No Module Installed") || block.contains("Not Installed") {
            continue;
        }

        if let Some(size) = field(block, "Size").and_then(ram_gigabytes) {
            facts.total_gb += size;
        }
        if facts.ram_type.is_none() {
            facts.ram_type = field(block, "Type").and_then(ram_type_from_text);
        }
        if facts.speed_mhz == 0 {
            facts.speed_mhz = field(block, "Speed")
                .and_then(first_number::<u32>)
                .unwrap_or(0);
        }
    }

    (facts.total_gb > 0.0 || facts.ram_type.is_some() || facts.speed_mhz > 0).then_some(facts)
}

/// `/proc/meminfo` total in gigabytes
pub fn meminfo_total(text: &str) -> Option<f64> {
    field(text, "MemTotal").and_then(ram_gigabytes)
}

/// `dmidecode -s bios-release-date` (or the sysfs equivalent)
pub fn bios_ram_type(text: &str) -> Option<&'static str> {
    ram_type_from_bios_date(text.lines().next()?)
}

/// `lsb_release -ds`
pub fn lsb_description(text: &str) -> Option<String> {
    if text.contains("No LSB modules") {
        return text
            .lines()
            .find(|line| !line.contains("No LSB modules"))
            .and_then(|line| lsb_description(line.trim()));
    }
    let line = text.lines().next()?.trim().trim_matches('"');
    (!line.is_empty()).then(|| clean(line))
}

/// `/etc/os-release` or `/etc/lsb-release`
pub fn os_release(text: &str) -> Option<String> {
    ["PRETTY_NAME", "DISTRIB_DESCRIPTION"].iter().find_map(|key| {
        text.lines().find_map(|line| {
            let value = line.trim().strip_prefix(key)?.strip_prefix('=')?;
            let value = clean(value.trim().trim_matches('"'));
            (!value.is_empty()).then_some(value)
        })
    })
}

/// `uname -r`
pub fn kernel(text: &str) -> Option<String> {
    kernel_major_minor(text.lines().next()?)
}

/// `lsblk -dno NAME,TYPE`: first real disk
pub fn primary_disk(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let mut cols = line.split_whitespace();
        let name = cols.next()?;
        let kind = cols.next().unwrap_or("disk");
        let skip = name.starts_with("loop") || name.starts_with("zram") || name.starts_with("sr");
        (kind == "disk" && !skip).then(|| name.to_string())
    })
}

/// Byte count or unit-suffixed size, first line only
pub fn size_gigabytes(text: &str) -> Option<f64> {
    disk_gigabytes(text.lines().next()?.trim())
}

/// `fdisk -l /dev/<disk>` header line
pub fn fdisk_gigabytes(text: &str) -> Option<f64> {
    let header = text
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Disk /dev/"))?;
    let (_, sizes) = header.split_once(':')?;

    sizes
        .split(',')
        .map(str::trim)
        .find(|part| part.ends_with("bytes"))
        .or(Some(sizes))
        .and_then(disk_gigabytes)
}

/// `/sys/block/<disk>/queue/rotational`
pub fn rotational_type(text: &str) -> Option<&'static str> {
    disk_type_from_rotational(text.lines().next()?)
}

/// `hdparm -t /dev/<disk>`: classify by buffered read throughput
pub fn throughput_type(text: &str) -> Option<&'static str> {
    let line = text.lines().find(|line| line.contains("MB/sec"))?;
    let (_, rate) = line.rsplit_once('=')?;
    let (mb_per_sec, unit) = parse_quantity(rate)?;
    if unit != "MB" {
        return None;
    }
    disk_type_from_throughput(mb_per_sec)
}
