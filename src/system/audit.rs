//! Hardware audit report and profile recommendations
//!
//! The report is produced by `amicachy-audit` (or `run_audit`) and consumed by
//! the installer, which only reads the per-profile status to decide which
//! profiles may be selected.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::hardware::{self, ArchLevel, BenchmarkResult, Virtualization};
use crate::profile::Profile;

/// Benchmark duration used by the auditor
pub const BENCHMARK_DURATION: Duration = Duration::from_secs(3);

/// Traffic-light compatibility of a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    #[default]
    Green,
    Yellow,
    Red,
}

impl std::fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileStatus::Green => write!(f, "green"),
            ProfileStatus::Yellow => write!(f, "yellow"),
            ProfileStatus::Red => write!(f, "red"),
        }
    }
}

/// Recommendation for one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileVerdict {
    /// Display name or identifier of the profile
    pub name: String,
    pub status: ProfileStatus,
    #[serde(default)]
    pub note: String,
}

/// CPU section of the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuReport {
    pub model: String,
    pub cores: usize,
    pub threads: usize,
    pub arch_level: ArchLevel,
}

/// Complete hardware audit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditReport {
    pub cpu: CpuReport,
    pub virtualization: Virtualization,
    pub benchmark: BenchmarkResult,
    pub profiles: Vec<ProfileVerdict>,
}

impl AuditReport {
    /// Load a report exported by the auditor
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read audit report: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse audit report: {}", path.display()))
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write audit report: {}", path.display()))
    }

    /// Verdict for a profile; profiles the report does not mention are green
    pub fn verdict_for(&self, profile: Profile) -> ProfileVerdict {
        self.profiles
            .iter()
            .find(|v| v.name == profile.display_name() || v.name == profile.id())
            .cloned()
            .unwrap_or_else(|| ProfileVerdict {
                name: profile.display_name().to_string(),
                status: ProfileStatus::Green,
                note: String::new(),
            })
    }

    /// Profiles that may be offered for selection
    pub fn allowed_profiles(&self) -> Vec<Profile> {
        Profile::ALL
            .into_iter()
            .filter(|p| self.verdict_for(*p).status != ProfileStatus::Red)
            .collect()
    }
}

/// Recommend profiles from detected capabilities and benchmark score
pub fn recommend_profiles(
    arch_level: ArchLevel,
    virt: &Virtualization,
    bench: &BenchmarkResult,
) -> Vec<ProfileVerdict> {
    let ratio = bench.reference_ratio;

    let classic = ProfileVerdict {
        name: Profile::Classic68k.display_name().to_string(),
        status: ProfileStatus::Green,
        note: "Fully supported on any modern CPU.".to_string(),
    };

    let (status, note) = if !virt.supported {
        (
            ProfileStatus::Red,
            "Virtualization (VT-x / AMD-V) not detected - PPC emulation unavailable.".to_string(),
        )
    } else if ratio < 0.8 {
        (
            ProfileStatus::Red,
            format!("CPU too slow for PPC emulation ({}x X5000).", ratio),
        )
    } else if ratio < 1.2 {
        (
            ProfileStatus::Yellow,
            format!("Marginal for PPC ({}x X5000). May stutter.", ratio),
        )
    } else {
        (
            ProfileStatus::Green,
            format!("Excellent for PPC ({}x X5000).", ratio),
        )
    };
    let ppc = ProfileVerdict {
        name: Profile::PpcNitro.display_name().to_string(),
        status,
        note,
    };

    let (status, note) = match arch_level {
        ArchLevel::V3 | ArchLevel::V4 => (
            ProfileStatus::Green,
            format!("CPU level {} - full CachyOS optimization.", arch_level),
        ),
        _ => (
            ProfileStatus::Yellow,
            format!(
                "CPU level {} - some CachyOS packages may fall back to generic.",
                arch_level
            ),
        ),
    };
    let dev = ProfileVerdict {
        name: Profile::DevStation.display_name().to_string(),
        status,
        note,
    };

    vec![classic, ppc, dev]
}

/// Run the full audit: CPU detection, virtualization check, benchmark
pub async fn run_audit(benchmark_duration: Duration) -> Result<AuditReport> {
    let cpu = hardware::detect_cpu();
    let arch_level = hardware::detect_arch_level(&cpu.flags);
    let virtualization = hardware::detect_virtualization(&cpu.flags);
    tracing::info!(
        "CPU: {} ({} cores / {} threads, {})",
        cpu.model_name,
        cpu.cores,
        cpu.threads,
        arch_level
    );

    let benchmark = tokio::task::spawn_blocking(move || hardware::run_benchmark(benchmark_duration))
        .await
        .context("Benchmark task failed")?;
    tracing::info!(
        "Benchmark: {} iter/s ({}x reference)",
        benchmark.rate,
        benchmark.reference_ratio
    );

    let profiles = recommend_profiles(arch_level, &virtualization, &benchmark);

    Ok(AuditReport {
        cpu: CpuReport {
            model: cpu.model_name,
            cores: cpu.cores,
            threads: cpu.threads,
            arch_level,
        },
        virtualization,
        benchmark,
        profiles,
    })
}
