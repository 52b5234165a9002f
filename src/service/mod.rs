pub mod approval;
pub mod directory;
pub mod duplicate;
pub mod normalize;
pub mod parser;
pub mod reimbursement;
pub mod rules;
pub mod token;
pub mod travel;
pub mod verification;

pub use approval::{ApprovalGateway, WeComApprovalGateway};
pub use directory::WeComEmployeeDirectory;
pub use duplicate::DuplicateCheckService;
pub use reimbursement::ReimbursementService;
pub use rules::RuleValidationService;
pub use token::AccessTokenService;
pub use travel::{BusinessTripService, TravelSubsidyService};
pub use verification::VerificationService;
