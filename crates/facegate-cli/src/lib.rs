pub mod cli;
pub mod commands;
pub mod config;
pub mod doctor;
pub mod errors;
pub mod identity;
pub mod notes;
pub mod output;
pub mod runtime;
