//! Core abstractions shared by detectors: finding records, severity scales,
//! and the `Scanner` trait the host framework drives.

pub mod result;
pub mod scanner;
pub mod severity;

pub use result::{Finding, FindingMetadata, Location};
pub use scanner::Scanner;
pub use severity::{Confidence, Severity};
