pub mod lock;
pub mod scheduler;
pub mod search_service;
pub mod trawl_service;

pub use lock::TermLocks;
pub use scheduler::TrawlScheduler;
pub use search_service::{MatchStage, SearchService};
pub use trawl_service::TrawlService;
