//! AmiCachy installer library
//!
//! Turns a blank disk into a bootable AmiCachy system: partitioning,
//! mounting, package installation, system configuration and a multi-profile
//! systemd-boot setup, driven by one background orchestrator task that
//! streams progress and log events to a control surface.

pub mod commands;
pub mod config;
pub mod constants;
pub mod install_log;
pub mod profile;
pub mod state;
pub mod system;
pub mod templates;
