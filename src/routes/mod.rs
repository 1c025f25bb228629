pub mod admin;
pub mod auth;
pub mod billing;
pub mod health;
pub mod webhooks;
