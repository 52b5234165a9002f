pub mod approval;
pub mod duplicate;
pub mod invoice;
pub mod validation;

pub use approval::{
    ApplyData, ApprovalRequest, ApprovalResponse, Approver, ReimbursementSubmit,
};
pub use duplicate::{DuplicateCheckRecord, DuplicateCheckResult, DuplicateStrategy};
pub use invoice::{InvoiceInfo, InvoiceParseResult};
pub use validation::{
    BatchValidationResult, InvoiceValidationResult, RuleViolation, Severity, ValidationResult,
    VerificationResult, VerificationStatus,
};
