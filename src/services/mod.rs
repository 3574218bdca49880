// All service modules
pub mod claim_engine;
pub mod draw;
pub mod game_service;
pub mod lookup_directory;
pub mod reconciliation;

// Re-export for convenience
pub use draw::ThreadRandom;
pub use game_service::GameService;
