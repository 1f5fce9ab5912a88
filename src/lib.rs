pub mod certification;
pub mod config;
pub mod learn;
pub mod shared;
