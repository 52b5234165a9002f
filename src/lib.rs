pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::create_pool;
pub use error::ServiceError;
pub use service::{
    AccessTokenService, DuplicateCheckService, ReimbursementService, RuleValidationService,
    VerificationService, WeComApprovalGateway, WeComEmployeeDirectory,
};
