//! Host inspection: disks, CPU capabilities, hardware audit

pub mod audit;
pub mod disk;
pub mod hardware;
