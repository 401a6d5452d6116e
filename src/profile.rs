//! Runtime profiles and boot-profile selection
//!
//! The profile set is closed: every profile has a fixed boot entry, title and
//! kernel command line. Only the profiles a user selects get a boot entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::system::audit::{AuditReport, ProfileStatus};

/// Kernel options shared by every profile
const BASE_OPTIONS: &str =
    "root=LABEL=AMICACHY rw quiet splash loglevel=3 vt.global_cursor_default=0";

/// A bootable runtime profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Profile {
    #[serde(rename = "classic_68k")]
    Classic68k,
    #[serde(rename = "ppc_nitro")]
    PpcNitro,
    #[serde(rename = "dev_station")]
    DevStation,
}

impl Profile {
    /// All profiles in boot-menu order
    pub const ALL: [Profile; 3] = [Profile::Classic68k, Profile::PpcNitro, Profile::DevStation];

    /// Stable identifier
    pub fn id(&self) -> &'static str {
        match self {
            Profile::Classic68k => "classic_68k",
            Profile::PpcNitro => "ppc_nitro",
            Profile::DevStation => "dev_station",
        }
    }

    /// Name shown to users (and used by the hardware audit report)
    pub fn display_name(&self) -> &'static str {
        match self {
            Profile::Classic68k => "Classic 68k",
            Profile::PpcNitro => "PPC Nitro",
            Profile::DevStation => "Dev Station",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Profile::Classic68k => "Amiga 500/1200 emulation (68k processor)",
            Profile::PpcNitro => "AmigaOS 4.1 PowerPC emulation (high performance)",
            Profile::DevStation => "Development workstation with code editor and Amiberry",
        }
    }

    /// Boot entry filename under loader/entries
    pub fn entry_filename(&self) -> &'static str {
        match self {
            Profile::Classic68k => "01-classic-68k.conf",
            Profile::PpcNitro => "02-ppc-nitro.conf",
            Profile::DevStation => "03-dev-station.conf",
        }
    }

    /// Boot menu title
    pub fn title(&self) -> &'static str {
        match self {
            Profile::Classic68k => "AmiCachyEnv - Classic 68k",
            Profile::PpcNitro => "AmiCachyEnv - PPC Nitro",
            Profile::DevStation => "AmiCachyEnv - Dev Station",
        }
    }

    /// Kernel command line
    pub fn kernel_options(&self) -> String {
        match self {
            // Emulation profiles trade mitigations for latency
            Profile::Classic68k | Profile::PpcNitro => format!(
                "{} amiprofile={} mitigations=off nowatchdog",
                BASE_OPTIONS,
                self.id()
            ),
            Profile::DevStation => format!("{} amiprofile={}", BASE_OPTIONS, self.id()),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Profile::ALL
            .into_iter()
            .find(|p| p.id() == s || p.display_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown profile '{}' (expected one of: classic_68k, ppc_nitro, dev_station)",
                    s
                )
            })
    }
}

/// Why a profile selection was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("at least one boot profile must be selected")]
    Empty,
    #[error("default profile {0} is not among the selected profiles")]
    DefaultNotSelected(Profile),
    #[error("profile {profile} is not compatible with this hardware: {note}")]
    Incompatible { profile: Profile, note: String },
}

/// A validated, ordered set of profiles with a default among them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSelection {
    selected: Vec<Profile>,
    default: Profile,
}

impl ProfileSelection {
    /// Validate a selection against the hardware audit (if any).
    /// Duplicates collapse to their first occurrence.
    pub fn new(
        selected: &[Profile],
        default: Profile,
        audit: Option<&AuditReport>,
    ) -> Result<Self, SelectionError> {
        let mut ordered: Vec<Profile> = Vec::with_capacity(selected.len());
        for profile in selected {
            if !ordered.contains(profile) {
                ordered.push(*profile);
            }
        }

        if ordered.is_empty() {
            return Err(SelectionError::Empty);
        }
        if !ordered.contains(&default) {
            return Err(SelectionError::DefaultNotSelected(default));
        }

        if let Some(report) = audit {
            for profile in &ordered {
                let verdict = report.verdict_for(*profile);
                if verdict.status == ProfileStatus::Red {
                    return Err(SelectionError::Incompatible {
                        profile: *profile,
                        note: verdict.note,
                    });
                }
            }
        }

        Ok(Self {
            selected: ordered,
            default,
        })
    }

    pub fn selected(&self) -> &[Profile] {
        &self.selected
    }

    pub fn default_profile(&self) -> Profile {
        self.default
    }
}
