//! Remote hardware detection
//!
//! Produces a [`HardwareSnapshot`] from a [`RemoteShell`]. The structured
//! `inxi` report is tried first; when it is missing or incomplete, every
//! attribute walks its own ordered list of [`Probe`]s, most authoritative
//! first, until one yields a value.

pub mod inxi;
pub mod parsers;

use tracing::{debug, info};

use crate::model::{CollectionStatus, HardwareSnapshot};
use crate::normalize::{
    commercial_disk_size, describe_ram, disk_type_from_capacity, disk_type_from_name,
    ram_type_from_cpu, ram_type_from_speed,
};
use crate::ssh::{is_hard_failure, RemoteShell};

/// Minimum resolved hardware facts for a full success
pub const SUCCESS_FIELD_THRESHOLD: usize = 3;

/// One candidate command for an attribute and the parser for its output
#[derive(Debug, Clone)]
pub struct Probe<T> {
    pub command: String,
    pub parse: fn(&str) -> Option<T>,
}

impl<T> Probe<T> {
    pub fn new(command: impl Into<String>, parse: fn(&str) -> Option<T>) -> Self {
        Self {
            command: command.into(),
            parse,
        }
    }
}

/// Detector for gathering hardware facts over one shell
pub struct DetectionEngine<'a> {
    shell: &'a dyn RemoteShell,
}

impl<'a> DetectionEngine<'a> {
    /// Create a new detection engine
    pub fn new(shell: &'a dyn RemoteShell) -> Self {
        Self { shell }
    }

    /// Detect the full snapshot and grade it
    pub async fn detect(&self) -> (HardwareSnapshot, CollectionStatus) {
        if let Some(snapshot) = self.fast_path().await {
            info!(host = self.shell.host(), "Hardware collected from inxi report");
            return (snapshot, CollectionStatus::Success);
        }

        let snapshot = self.cascade().await;
        let resolved = snapshot.resolved_count();
        let status = if resolved >= SUCCESS_FIELD_THRESHOLD {
            CollectionStatus::Success
        } else {
            CollectionStatus::PartialSuccess
        };
        info!(host = self.shell.host(), resolved, %status, "Hardware collected by probe cascade");
        (snapshot, status)
    }

    /// Structured report, accepted only with processor and memory resolved
    pub async fn fast_path(&self) -> Option<HardwareSnapshot> {
        let output = self.shell.run(inxi::INXI_COMMAND, false).await?;
        inxi::parse(&output.stdout)
    }

    /// Per-attribute probe cascade
    pub async fn cascade(&self) -> HardwareSnapshot {
        let mut snapshot = HardwareSnapshot::default();

        if let Some(release) = self.detect_os_release().await {
            snapshot.os_release = release;
        }
        if let Some(kernel) = self.detect_kernel().await {
            snapshot.kernel = kernel;
        }
        if let Some(processor) = self.detect_processor().await {
            snapshot.processor = processor;
        }
        if let Some(topology) = self.detect_cores_threads().await {
            snapshot.cores_threads = topology;
        }
        if let Some(board) = self.detect_motherboard().await {
            snapshot.motherboard = board;
        }
        if let Some(ram) = self.detect_ram(&snapshot.processor).await {
            snapshot.ram = ram;
        }
        let (disk_type, capacity) = self.detect_disk().await;
        if let Some(disk_type) = disk_type {
            snapshot.disk_type = disk_type.to_string();
        }
        if let Some(capacity) = capacity {
            snapshot.disk_capacity = capacity;
        }

        snapshot.normalized()
    }

    /// Run probes in order, each escalated then plain; first parsed value wins
    pub async fn first_match<T: Send>(&self, probes: &[Probe<T>]) -> Option<T> {
        for probe in probes {
            for escalate in [true, false] {
                let Some(output) = self.shell.run(&probe.command, escalate).await else {
                    continue;
                };
                let stdout = output.stdout.trim();
                if stdout.is_empty() || is_hard_failure(stdout) {
                    continue;
                }
                if let Some(value) = (probe.parse)(stdout) {
                    debug!(host = self.shell.host(), command = %probe.command, escalate, "Probe matched");
                    return Some(value);
                }
            }
        }
        None
    }

    async fn detect_os_release(&self) -> Option<String> {
        self.first_match(&[
            Probe::new("lsb_release -ds", parsers::lsb_description),
            Probe::new("cat /etc/os-release", parsers::os_release),
            Probe::new("cat /etc/lsb-release", parsers::os_release),
        ])
        .await
    }

    async fn detect_kernel(&self) -> Option<String> {
        self.first_match(&[Probe::new("uname -r", parsers::kernel)])
            .await
    }

    async fn detect_processor(&self) -> Option<String> {
        self.first_match(&[
            Probe::new("lscpu", parsers::lscpu_model),
            Probe::new("cat /proc/cpuinfo", parsers::cpuinfo_model),
        ])
        .await
    }

    async fn detect_cores_threads(&self) -> Option<String> {
        self.first_match(&[
            Probe::new("lscpu", parsers::lscpu_topology),
            Probe::new("cat /proc/cpuinfo", parsers::cpuinfo_topology),
        ])
        .await
    }

    async fn detect_motherboard(&self) -> Option<String> {
        self.first_match(&[
            Probe::new("dmidecode -t baseboard", parsers::baseboard),
            Probe::new(
                "cat /sys/devices/virtual/dmi/id/board_vendor /sys/devices/virtual/dmi/id/board_name",
                parsers::board_pair,
            ),
            Probe::new(
                "cat /sys/class/dmi/id/board_vendor /sys/class/dmi/id/board_name",
                parsers::board_pair,
            ),
            Probe::new("lshw -c motherboard", parsers::lshw_board),
        ])
        .await
    }

    /// Memory size from firmware tables or the kernel; generation from
    /// firmware text, clock speed, CPU model, then firmware build year
    async fn detect_ram(&self, processor: &str) -> Option<String> {
        let facts = self
            .first_match(&[Probe::new("dmidecode -t memory", parsers::dmi_memory)])
            .await
            .unwrap_or_default();

        let total_gb = if facts.total_gb > 0.0 {
            facts.total_gb
        } else {
            self.first_match(&[Probe::new("cat /proc/meminfo", parsers::meminfo_total)])
                .await?
        };

        let mut ram_type = facts
            .ram_type
            .or_else(|| ram_type_from_speed(facts.speed_mhz))
            .or_else(|| ram_type_from_cpu(processor));
        if ram_type.is_none() {
            ram_type = self
                .first_match(&[
                    Probe::new("dmidecode -s bios-release-date", parsers::bios_ram_type),
                    Probe::new("cat /sys/class/dmi/id/bios_date", parsers::bios_ram_type),
                ])
                .await;
        }

        describe_ram(total_gb, ram_type)
    }

    /// Disk type and marketed capacity of the primary disk
    async fn detect_disk(&self) -> (Option<&'static str>, Option<String>) {
        let device = self
            .first_match(&[Probe::new("lsblk -dno NAME,TYPE", parsers::primary_disk)])
            .await;

        let mut size_probes = Vec::new();
        if let Some(dev) = &device {
            size_probes.push(Probe::new(format!("lsblk -dbno SIZE /dev/{dev}"), parsers::size_gigabytes));
            size_probes.push(Probe::new(format!("fdisk -l /dev/{dev}"), parsers::fdisk_gigabytes));
        }
        size_probes.push(Probe::new("lsblk -dbno SIZE", parsers::size_gigabytes));
        let size_gb = self.first_match(&size_probes).await;

        let mut disk_type = device.as_deref().and_then(disk_type_from_name);
        if disk_type.is_none() {
            if let Some(dev) = &device {
                disk_type = self
                    .first_match(&[Probe::new(
                        format!("cat /sys/block/{dev}/queue/rotational"),
                        parsers::rotational_type,
                    )])
                    .await;
                if disk_type.is_none() {
                    disk_type = self
                        .first_match(&[Probe::new(
                            format!("hdparm -t /dev/{dev}"),
                            parsers::throughput_type,
                        )])
                        .await;
                }
            }
        }
        if disk_type.is_none() {
            disk_type = size_gb.and_then(disk_type_from_capacity);
        }

        (disk_type, size_gb.and_then(commercial_disk_size))
    }
}
