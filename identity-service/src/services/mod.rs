mod login_tracker;
mod memory;
mod postgres;
mod store;
mod token;

pub use login_tracker::LoginAttemptTracker;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::Store;
pub use token::{Claims, JwtService, TokenError, TokenPurpose};
