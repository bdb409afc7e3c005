pub mod api;
pub mod cache;
pub mod config;
pub mod model;
pub mod pipeline;
pub mod reader;
pub mod scheduler;

pub use cache::CacheStore;
pub use config::Settings;
pub use reader::CaseData;
pub use scheduler::BatchScheduler;
