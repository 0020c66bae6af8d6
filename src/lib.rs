// Public API - the runner drives both the bootstrap and the stack declaration
pub mod infra;
pub mod runner;

// Internal modules
mod config;
mod db;
