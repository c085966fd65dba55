use crate::core::{Confidence, Severity};
use serde::{Deserialize, Serialize};

/// A point in the analyzed control-flow graph. The core never sees source
/// text, so locations are expressed as contract/function/node coordinates;
/// the reporting collaborator maps them back to source positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Location {
    pub contract: String,
    pub function: String,
    pub node: u32,
}

impl Location {
    pub fn new(contract: String, function: String, node: u32) -> Self {
        Self {
            contract,
            function,
            node,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub scanner_id: String,

    pub finding_type: String,

    pub severity: Severity,

    pub confidence: Confidence,

    pub confidence_score: f64,

    pub title: String,

    pub description: String,

    pub locations: Vec<Location>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FindingMetadata>,
}

impl Finding {
    pub fn new(
        scanner_id: String,
        severity: Severity,
        confidence: Confidence,
        title: String,
        description: String,
    ) -> Self {
        Self {
            scanner_id: scanner_id.clone(),
            finding_type: scanner_id,
            severity,
            confidence,
            confidence_score: confidence.to_score(),
            title,
            description,
            locations: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_finding_type(mut self, finding_type: String) -> Self {
        self.finding_type = finding_type;
        self
    }

    pub fn with_contract(mut self, contract: &str) -> Self {
        self.metadata
            .get_or_insert_with(FindingMetadata::default)
            .affected_contracts
            .push(contract.to_string());
        self
    }

    pub fn with_function(mut self, function: &str) -> Self {
        self.metadata
            .get_or_insert_with(FindingMetadata::default)
            .affected_functions
            .push(function.to_string());
        self
    }

    pub fn with_variable(mut self, variable: &str) -> Self {
        self.metadata
            .get_or_insert_with(FindingMetadata::default)
            .affected_variables
            .push(variable.to_string());
        self
    }

    pub fn priority_score(&self) -> u32 {
        let severity_score = match self.severity {
            Severity::Critical => 1000,
            Severity::High => 100,
            Severity::Medium => 10,
            Severity::Low => 1,
            Severity::Informational => 0,
        };

        let confidence_multiplier = match self.confidence {
            Confidence::High => 10,
            Confidence::Medium => 5,
            Confidence::Low => 1,
        };

        severity_score * confidence_multiplier
    }

    pub fn dedup_key(&self) -> String {
        let mut key = format!("{}:{}", self.finding_type, self.scanner_id);

        if let Some(loc) = self.locations.first() {
            key.push_str(&format!(":{}:{}:{}", loc.contract, loc.function, loc.node));
        }

        key
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FindingMetadata {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub affected_functions: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub affected_variables: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub affected_contracts: Vec<String>,
}
