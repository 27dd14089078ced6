pub mod auth;
pub mod lists;
pub mod notifications;
pub mod tasks;
pub mod users;
