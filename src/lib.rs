pub mod config;
pub mod cycle;
pub mod error;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod retry;
pub mod schedule;
pub mod stats;
pub mod time;
