//! Scanner trait: the in-process boundary between the analysis core and the
//! host framework that registers detectors and formats their findings.
//!
//! Scanners hold no shared mutable state; a host may run several of them over
//! the same `Program` in parallel.

use crate::core::{Confidence, Finding, Severity};
use crate::ir::Program;
use anyhow::Result;

pub trait Scanner: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        "No description provided"
    }

    fn severity(&self) -> Severity;

    fn confidence(&self) -> Confidence;

    /// Run the detector over an already-built control-flow representation.
    /// Internal analysis failures degrade into findings rather than errors;
    /// `Err` is reserved for misuse of the API itself.
    fn scan(&self, program: &Program) -> Result<Vec<Finding>>;

    fn enabled_by_default(&self) -> bool {
        true
    }
}
