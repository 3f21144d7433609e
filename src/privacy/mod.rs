//! Privacy gates: PII redaction and compliance validation

pub mod compliance;
pub mod pii;

pub use compliance::{ComplianceValidator, ComplianceVerdict};
pub use pii::{PiiCategory, PiiDetector, PiiFinding, Redaction, RedactionMap, restore};
