pub mod assignment;
pub mod auth;
pub mod booking;
pub mod drivers;
pub mod messaging;
pub mod notifications;
pub mod pricing;
