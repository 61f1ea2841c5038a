mod account;
mod invite;
mod security;

pub use account::*;
pub use invite::*;
pub use security::*;
