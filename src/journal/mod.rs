//! Trade journal: lifecycle state machine over a pluggable repository.

mod lifecycle;
mod repository;

pub use lifecycle::TradeLifecycle;
pub use repository::JournalRepository;
