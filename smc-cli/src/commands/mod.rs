pub mod admin;
pub mod bootstrap;
pub mod fields;
pub mod logs;
pub mod monitor;
pub mod search;
