pub mod auth;
pub mod health;
pub mod queue;
pub mod session;
pub mod ui;
pub mod upload;
