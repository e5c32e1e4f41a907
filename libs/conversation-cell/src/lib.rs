pub mod handlers;
pub mod models;
pub mod notify;
pub mod router;
pub mod services;
