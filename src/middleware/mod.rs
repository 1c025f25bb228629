pub mod admin;
pub mod auth;
pub mod premium;
pub mod rate_limit;

pub use admin::*;
pub use auth::*;
pub use premium::*;
pub use rate_limit::*;
