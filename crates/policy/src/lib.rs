//! Carrier error-policy documents: parsing, compilation and resolution.

mod document;
mod policy;
mod set;

pub use document::{ApnPolicyMap, parse_document, strip_comments};
pub use policy::{ErrorDetail, ErrorPolicy, NO_RETRY_SECS, PolicyType, RetryInterval};
pub use set::{PolicySet, WILDCARD_APN};
