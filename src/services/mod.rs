pub mod entitlement;
pub mod stripe_service;
pub mod subscription;
pub mod sweep;
