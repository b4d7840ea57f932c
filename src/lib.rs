pub mod commands;
pub mod config;
pub mod error;
pub mod merge;
pub mod metadata;
pub mod pipeline;
pub mod scanner;
