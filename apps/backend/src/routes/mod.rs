pub mod auth;
pub mod items;
pub mod stats;
pub mod study;
