pub mod fund_unlock_request;
pub mod investment;
pub mod milestone;
pub mod milestone_proof;
pub mod project;

pub use fund_unlock_request::RequestStatus;
pub use investment::InvestmentStatus;
pub use milestone::MilestoneStatus;
pub use milestone_proof::ProofStatus;
pub use project::ProjectStatus;

pub use fund_unlock_request::Entity as FundUnlockRequest;
pub use investment::Entity as Investment;
pub use milestone::Entity as Milestone;
pub use milestone_proof::Entity as MilestoneProof;
pub use project::Entity as Project;
