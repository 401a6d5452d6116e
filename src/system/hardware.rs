//! Hardware detection utilities for CPU capabilities and single-core speed

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::time::{Duration, Instant};

/// Approximate single-core throughput of an AmigaOne X5000 (P5020 @ 2.0 GHz),
/// tuned so a modern desktop CPU scores well above 1.0x
pub const X5000_REFERENCE_RATE: f64 = 38_000_000.0;

/// x86-64 microarchitecture level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchLevel {
    #[default]
    #[serde(rename = "x86-64 (baseline)")]
    Baseline,
    #[serde(rename = "x86-64-v2")]
    V2,
    #[serde(rename = "x86-64-v3")]
    V3,
    #[serde(rename = "x86-64-v4")]
    V4,
}

impl std::fmt::Display for ArchLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchLevel::Baseline => write!(f, "x86-64 (baseline)"),
            ArchLevel::V2 => write!(f, "x86-64-v2"),
            ArchLevel::V3 => write!(f, "x86-64-v3"),
            ArchLevel::V4 => write!(f, "x86-64-v4"),
        }
    }
}

/// CPU information parsed from /proc/cpuinfo
#[derive(Debug, Clone, Default)]
pub struct CpuInfo {
    pub model_name: String,
    pub flags: Vec<String>,
    pub cores: usize,
    pub threads: usize,
}

/// Hardware virtualization support
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Virtualization {
    pub intel_vtx: bool,
    pub amd_svm: bool,
    pub supported: bool,
}

/// Result of the single-core benchmark
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub iterations: u64,
    #[serde(alias = "elapsed_s")]
    pub elapsed_seconds: f64,
    pub rate: f64,
    #[serde(alias = "x5000_ratio")]
    pub reference_ratio: f64,
}

/// Detect CPU model, flags and core/thread counts from /proc/cpuinfo
pub fn detect_cpu() -> CpuInfo {
    match fs::read_to_string("/proc/cpuinfo") {
        Ok(content) => parse_cpuinfo(&content),
        Err(e) => {
            tracing::warn!("Failed to read /proc/cpuinfo: {}", e);
            CpuInfo {
                model_name: "Unknown".to_string(),
                ..CpuInfo::default()
            }
        }
    }
}

/// Parse /proc/cpuinfo content (one block per logical processor)
fn parse_cpuinfo(content: &str) -> CpuInfo {
    let blocks: Vec<&str> = content
        .trim()
        .split("\n\n")
        .filter(|b| !b.trim().is_empty())
        .collect();

    let mut info = CpuInfo {
        model_name: "Unknown".to_string(),
        threads: blocks.len(),
        ..CpuInfo::default()
    };
    let mut core_ids: HashSet<&str> = HashSet::new();

    for block in &blocks {
        for line in block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "model name" => info.model_name = value.to_string(),
                "flags" => info.flags = value.split_whitespace().map(String::from).collect(),
                "core id" => {
                    core_ids.insert(value);
                }
                _ => {}
            }
        }
    }

    info.cores = if core_ids.is_empty() {
        info.threads
    } else {
        core_ids.len()
    };
    info
}

/// Determine the x86-64 microarchitecture level from CPU flags
pub fn detect_arch_level(flags: &[String]) -> ArchLevel {
    let has = |wanted: &[&str]| wanted.iter().all(|f| flags.iter().any(|x| x == f));

    if has(&["avx512f", "avx512bw", "avx512cd", "avx512dq", "avx512vl"]) {
        ArchLevel::V4
    } else if has(&["avx2", "bmi1", "bmi2", "fma", "lzcnt", "movbe"]) {
        ArchLevel::V3
    } else if has(&["cx16", "lahf_lm", "popcnt", "sse4_1", "sse4_2", "ssse3"]) {
        ArchLevel::V2
    } else {
        ArchLevel::Baseline
    }
}

/// Check for VT-x (vmx) or AMD-V (svm)
pub fn detect_virtualization(flags: &[String]) -> Virtualization {
    let intel_vtx = flags.iter().any(|f| f == "vmx");
    let amd_svm = flags.iter().any(|f| f == "svm");
    Virtualization {
        intel_vtx,
        amd_svm,
        supported: intel_vtx || amd_svm,
    }
}

/// CPU-bound loop measuring iterations per second on one core.
/// Blocks the calling thread for `duration`.
pub fn run_benchmark(duration: Duration) -> BenchmarkResult {
    let mut iterations: u64 = 0;
    let start = Instant::now();
    let mut x: f64 = 1.0;

    while start.elapsed() < duration {
        for _ in 0..10_000 {
            x = (x + 1.0).sin() * (x - 1.0).cos() + (x.abs() + 1.0).sqrt();
            iterations += 1;
        }
    }
    std::hint::black_box(x);

    let elapsed = start.elapsed().as_secs_f64();
    let rate = iterations as f64 / elapsed;
    BenchmarkResult {
        iterations,
        elapsed_seconds: round_to(elapsed, 3),
        rate: rate.round(),
        reference_ratio: round_to(rate / X5000_REFERENCE_RATE, 2),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
