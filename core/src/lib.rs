pub mod agent;
pub mod approval;
pub mod card;
pub mod config;
pub mod error;
pub mod llm;
pub mod manager;
pub mod policy;
pub mod protocol;
pub mod router;
pub mod session;
pub mod task;
pub mod tool;
pub mod tools;

// Re-exports for convenience
pub use approval::{ApprovalDecision, ApprovalManager, PendingApproval, TimeoutPolicy};
pub use card::AgentCard;
pub use config::Config;
pub use error::{Result, StewardError};
pub use manager::TaskManager;
pub use router::TaskRouter;
pub use task::{Task, TaskState};
