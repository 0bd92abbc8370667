//! Normalization rules for raw probe output
//!
//! Every function here is pure: the same raw text always yields the same
//! normalized value, which keeps re-runs against unchanged hosts diff-free.

/// Marketed disk sizes in decimal gigabytes, ascending
pub const COMMERCIAL_DISK_SIZES_GB: [u32; 15] = [
    60, 120, 128, 240, 250, 256, 320, 480, 500, 512, 960, 1000, 2000, 4000, 8000,
];

/// Upper edge of the band around a commercial size
const DISK_UPPER_TOLERANCE: f64 = 1.05;
/// Lower edge; wide enough to cover a decimal size reported in binary units
const DISK_LOWER_TOLERANCE: f64 = 0.90;

/// RAM size buckets as `(upper threshold, bucket)` in gigabytes
const RAM_BUCKETS: [(f64, u32); 6] = [
    (1.1, 1),
    (2.1, 2),
    (4.1, 4),
    (8.1, 8),
    (16.1, 16),
    (32.1, 32),
];

/// CPU model keywords implying DDR4 memory
const DDR4_CPU_KEYWORDS: [&str; 12] = [
    "i3-9", "i5-9", "i7-9", "i3-8", "i5-8", "i7-8", "ryzen 3", "ryzen 5", "ryzen 7", "i3-7",
    "i5-7", "i7-7",
];

/// CPU model keywords implying DDR3 memory
const DDR3_CPU_KEYWORDS: [&str; 17] = [
    "i3-2", "i3-3", "i3-4", "i3-5", "i3-6", "i5-2", "i5-3", "i5-4", "i5-5", "i5-6", "i7-2", "i7-3",
    "i7-4", "i7-5", "i7-6", "pentium", "celeron",
];

/// Collapse runs of whitespace and trim
#[must_use]
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split the first number in `text` from the unit that follows it.
///
/// Accepts a comma as decimal separator. The unit is the run of letters right
/// after the number (possibly after spaces), uppercased; empty when absent.
#[must_use]
pub fn parse_quantity(text: &str) -> Option<(f64, String)> {
    let text = text.replace(',', ".");
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let value: f64 = rest[..end].trim_end_matches('.').parse().ok()?;
    let unit: String = rest[end..]
        .trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    Some((value, unit.to_ascii_uppercase()))
}

/// Memory amount in gigabytes. Binary and decimal units are read alike;
/// a bare number is taken as bytes.
#[must_use]
pub fn ram_gigabytes(text: &str) -> Option<f64> {
    let (value, unit) = parse_quantity(text)?;
    let gb = match unit.as_str() {
        "" | "B" => value / 1024f64.powi(3),
        "K" | "KB" | "KIB" => value / 1024f64.powi(2),
        "M" | "MB" | "MIB" => value / 1024.0,
        "G" | "GB" | "GIB" => value,
        "T" | "TB" | "TIB" => value * 1024.0,
        _ => return None,
    };
    (gb > 0.0).then_some(gb)
}

/// Snap a memory size to its commercial bucket, e.g. `3.7` to `"4GB"`
#[must_use]
pub fn bucket_ram(gb: f64) -> Option<String> {
    if !gb.is_finite() || gb <= 0.0 {
        return None;
    }
    let size = RAM_BUCKETS
        .iter()
        .find(|(threshold, _)| gb <= *threshold)
        .map_or_else(|| gb.round() as u64, |(_, bucket)| u64::from(*bucket));
    Some(format!("{size}GB"))
}

/// Memory generation named in firmware text; newest generation wins
#[must_use]
pub fn ram_type_from_text(text: &str) -> Option<&'static str> {
    let upper = text.to_ascii_uppercase();
    ["DDR5", "DDR4", "DDR3", "DDR2", "DDR"]
        .into_iter()
        .find(|generation| upper.contains(generation))
}

/// Memory generation inferred from the module clock in MHz
#[must_use]
pub fn ram_type_from_speed(mhz: u32) -> Option<&'static str> {
    match mhz {
        0 => None,
        m if m >= 2133 => Some("DDR4"),
        m if m > 1000 => Some("DDR3"),
        _ => Some("DDR2"),
    }
}

/// Memory generation inferred from the CPU model string
#[must_use]
pub fn ram_type_from_cpu(model: &str) -> Option<&'static str> {
    let lower = model.to_lowercase();
    if DDR4_CPU_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some("DDR4")
    } else if DDR3_CPU_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some("DDR3")
    } else {
        None
    }
}

/// Memory generation inferred from the firmware release date (last resort)
#[must_use]
pub fn ram_type_from_bios_date(date: &str) -> Option<&'static str> {
    let year = bios_year(date)?;
    Some(match year {
        y if y >= 2017 => "DDR4",
        y if y >= 2010 => "DDR3",
        _ => "DDR2",
    })
}

/// Four-digit year at the end of a `MM/DD/YYYY`-style date
fn bios_year(date: &str) -> Option<u32> {
    let date = date.trim();
    let tail = date.get(date.len().checked_sub(4)?..)?;
    tail.parse()
        .ok()
        .filter(|year| (1980..=2100).contains(year))
}

/// Render the RAM field, e.g. `8GB DDR4` or `8GB`
#[must_use]
pub fn describe_ram(gb: f64, ram_type: Option<&str>) -> Option<String> {
    let size = bucket_ram(gb)?;
    Some(match ram_type {
        Some(kind) => format!("{size} {kind}"),
        None => size,
    })
}

/// Disk size in gigabytes. Unit-suffixed values keep their number in the
/// unit's gigabyte scale (GB or GiB alike); a bare number is a byte count.
#[must_use]
pub fn disk_gigabytes(text: &str) -> Option<f64> {
    let (value, unit) = parse_quantity(text)?;
    let gb = match unit.as_str() {
        "" | "B" | "BYTES" => value / 1e9,
        "M" | "MB" => value / 1000.0,
        "MIB" => value / 1024.0,
        "G" | "GB" | "GIB" => value,
        "T" | "TB" => value * 1000.0,
        "TIB" => value * 1024.0,
        _ => return None,
    };
    (gb > 0.0).then_some(gb)
}

/// Map a raw disk size to the nearest marketed size.
///
/// A commercial size `s` is a candidate when `0.9·s <= gb <= 1.05·s`; the
/// closest candidate wins. Sizes outside every band are rounded to whole GB,
/// or to tenths of a TB from 1000GB up.
#[must_use]
pub fn commercial_disk_size(gb: f64) -> Option<String> {
    if !gb.is_finite() || gb <= 0.0 {
        return None;
    }

    let nearest = COMMERCIAL_DISK_SIZES_GB
        .iter()
        .map(|size| f64::from(*size))
        .filter(|size| gb >= size * DISK_LOWER_TOLERANCE && gb <= size * DISK_UPPER_TOLERANCE)
        .min_by(|a, b| (gb - a).abs().total_cmp(&(gb - b).abs()));

    Some(match nearest {
        Some(size) => format!("{size:.0}GB"),
        None if gb.round() >= 1000.0 => {
            let tb = format!("{:.1}", gb / 1000.0);
            format!("{}TB", tb.trim_end_matches(".0"))
        }
        None => format!("{:.0}GB", gb.round().max(1.0)),
    })
}

/// Disk type implied by the device name
#[must_use]
pub fn disk_type_from_name(device: &str) -> Option<&'static str> {
    device.to_lowercase().contains("nvme").then_some("SSD")
}

/// Disk type from `/sys/block/<dev>/queue/rotational`
#[must_use]
pub fn disk_type_from_rotational(flag: &str) -> Option<&'static str> {
    match flag.trim() {
        "0" => Some("SSD"),
        "1" => Some("HDD"),
        _ => None,
    }
}

/// Disk type from measured sequential read throughput in MB/s
#[must_use]
pub fn disk_type_from_throughput(mb_per_sec: f64) -> Option<&'static str> {
    if !mb_per_sec.is_finite() || mb_per_sec <= 0.0 {
        return None;
    }
    Some(if mb_per_sec > 100.0 { "SSD" } else { "HDD" })
}

/// Low-confidence disk type guess from capacity in decimal GB
#[must_use]
pub fn disk_type_from_capacity(gb: f64) -> Option<&'static str> {
    if gb <= 0.0 {
        None
    } else if gb <= 256.0 {
        Some("SSD")
    } else if gb >= 1000.0 {
        Some("HDD")
    } else {
        None
    }
}

/// Reduce `uname -r` output to `major.minor`
#[must_use]
pub fn kernel_major_minor(release: &str) -> Option<String> {
    let base = release.trim().split('-').next()?;
    let mut parts = base.split('.');
    let major = parts.next().filter(|p| !p.is_empty())?;
    Some(match parts.next() {
        Some(minor) if !minor.is_empty() => format!("{major}.{minor}"),
        _ => major.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("MemTotal: 3884532 kB"), Some((3884532.0, "KB".to_string())));
        assert_eq!(parse_quantity("119,2 GiB"), Some((119.2, "GIB".to_string())));
        assert_eq!(parse_quantity("500107862016"), Some((500107862016.0, String::new())));
        assert_eq!(parse_quantity("no digits"), None);
    }

    #[test]
    fn test_bucket_ram() {
        assert_eq!(bucket_ram(0.9).as_deref(), Some("1GB"));
        assert_eq!(bucket_ram(1.1).as_deref(), Some("1GB"));
        assert_eq!(bucket_ram(1.5).as_deref(), Some("2GB"));
        assert_eq!(bucket_ram(3.7).as_deref(), Some("4GB"));
        assert_eq!(bucket_ram(7.6).as_deref(), Some("8GB"));
        assert_eq!(bucket_ram(15.5).as_deref(), Some("16GB"));
        assert_eq!(bucket_ram(32.1).as_deref(), Some("32GB"));
        assert_eq!(bucket_ram(33.0).as_deref(), Some("33GB"));
        assert_eq!(bucket_ram(62.8).as_deref(), Some("63GB"));
        assert_eq!(bucket_ram(0.0), None);
        assert_eq!(bucket_ram(f64::NAN), None);
    }

    #[test]
    fn test_ram_gigabytes_units() {
        let meminfo = ram_gigabytes("3884532 kB").unwrap();
        assert!((meminfo - 3.704).abs() < 0.01);
        assert_eq!(ram_gigabytes("4096 MB"), Some(4.0));
        assert_eq!(ram_gigabytes("8 GB"), Some(8.0));
        assert_eq!(ram_gigabytes("0 MB"), None);
        assert_eq!(ram_gigabytes("12 parsecs"), None);
    }

    #[test]
    fn test_ram_type_from_text_prefers_newest() {
        assert_eq!(ram_type_from_text("Type: DDR4"), Some("DDR4"));
        assert_eq!(ram_type_from_text("lpddr5 module"), Some("DDR5"));
        assert_eq!(ram_type_from_text("DDR3 DDR4"), Some("DDR4"));
        assert_eq!(ram_type_from_text("Type: DDR"), Some("DDR"));
        assert_eq!(ram_type_from_text("Type: Unknown"), None);
    }

    #[test]
    fn test_ram_type_from_speed() {
        assert_eq!(ram_type_from_speed(2400), Some("DDR4"));
        assert_eq!(ram_type_from_speed(2133), Some("DDR4"));
        assert_eq!(ram_type_from_speed(1600), Some("DDR3"));
        assert_eq!(ram_type_from_speed(1000), Some("DDR2"));
        assert_eq!(ram_type_from_speed(800), Some("DDR2"));
        assert_eq!(ram_type_from_speed(0), None);
    }

    #[test]
    fn test_ram_type_from_cpu() {
        assert_eq!(
            ram_type_from_cpu("Intel(R) Core(TM) i5-8400 CPU @ 2.80GHz"),
            Some("DDR4")
        );
        assert_eq!(ram_type_from_cpu("AMD Ryzen 5 3400G"), Some("DDR4"));
        assert_eq!(
            ram_type_from_cpu("Intel(R) Core(TM) i3-4170 CPU @ 3.70GHz"),
            Some("DDR3")
        );
        assert_eq!(ram_type_from_cpu("Intel(R) Celeron(R) CPU J1800"), Some("DDR3"));
        assert_eq!(ram_type_from_cpu("VIA Nano"), None);
    }

    #[test]
    fn test_ram_type_from_bios_date() {
        assert_eq!(ram_type_from_bios_date("03/14/2018"), Some("DDR4"));
        assert_eq!(ram_type_from_bios_date("11/02/2012\n"), Some("DDR3"));
        assert_eq!(ram_type_from_bios_date("06/30/2008"), Some("DDR2"));
        assert_eq!(ram_type_from_bios_date("unknown"), None);
        assert_eq!(ram_type_from_bios_date("12"), None);
    }

    #[test]
    fn test_describe_ram() {
        assert_eq!(describe_ram(7.7, Some("DDR4")).as_deref(), Some("8GB DDR4"));
        assert_eq!(describe_ram(3.7, None).as_deref(), Some("4GB"));
        assert_eq!(describe_ram(0.0, Some("DDR4")), None);
    }

    #[test]
    fn test_commercial_disk_size() {
        assert_eq!(commercial_disk_size(119.2).as_deref(), Some("120GB"));
        assert_eq!(commercial_disk_size(111.8).as_deref(), Some("120GB"));
        assert_eq!(commercial_disk_size(500.1).as_deref(), Some("500GB"));
        assert_eq!(commercial_disk_size(256.06).as_deref(), Some("256GB"));
        assert_eq!(commercial_disk_size(1000.2).as_deref(), Some("1000GB"));
        assert_eq!(commercial_disk_size(31.9).as_deref(), Some("32GB"));
        assert_eq!(commercial_disk_size(3000.6).as_deref(), Some("3TB"));
        assert_eq!(commercial_disk_size(12000.1).as_deref(), Some("12TB"));
        assert_eq!(commercial_disk_size(0.0), None);
    }

    #[test]
    fn test_disk_gigabytes_from_tib() {
        let gb = disk_gigabytes("3.63 TiB").unwrap();
        assert_eq!(commercial_disk_size(gb).as_deref(), Some("4000GB"));

        let gb = disk_gigabytes("119.2 GiB").unwrap();
        assert_eq!(commercial_disk_size(gb).as_deref(), Some("120GB"));
    }

    #[test]
    fn test_disk_gigabytes_from_bytes() {
        let gb = disk_gigabytes("500107862016").unwrap();
        assert_eq!(commercial_disk_size(gb).as_deref(), Some("500GB"));

        let gb = disk_gigabytes("128035676160").unwrap();
        assert_eq!(commercial_disk_size(gb).as_deref(), Some("128GB"));
    }

    #[test]
    fn test_disk_type_rules() {
        assert_eq!(disk_type_from_name("nvme0n1"), Some("SSD"));
        assert_eq!(disk_type_from_name("sda"), None);
        assert_eq!(disk_type_from_rotational("0\n"), Some("SSD"));
        assert_eq!(disk_type_from_rotational("1"), Some("HDD"));
        assert_eq!(disk_type_from_rotational(""), None);
        assert_eq!(disk_type_from_throughput(450.3), Some("SSD"));
        assert_eq!(disk_type_from_throughput(98.0), Some("HDD"));
        assert_eq!(disk_type_from_capacity(120.0), Some("SSD"));
        assert_eq!(disk_type_from_capacity(2000.0), Some("HDD"));
        assert_eq!(disk_type_from_capacity(500.0), None);
    }

    #[test]
    fn test_kernel_major_minor() {
        assert_eq!(kernel_major_minor("5.15.0-91-generic").as_deref(), Some("5.15"));
        assert_eq!(kernel_major_minor("4.9.0\n").as_deref(), Some("4.9"));
        assert_eq!(kernel_major_minor("6").as_deref(), Some("6"));
        assert_eq!(kernel_major_minor(""), None);
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("  ASUSTeK   COMPUTER\tINC. \n"), "ASUSTeK COMPUTER INC.");
    }
}
