//! Configuration constants for the bootstrap tool
//!
//! This module centralizes the tunable parameters used when talking to the
//! database. Stack-level settings for the infrastructure declaration live in
//! `infra::stack::StackConfig`.

use std::time::Duration;

// ============================================================================
// Connection Pool Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a caller waits for a pooled connection before giving up
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_PORT: u16 = 5432;

/// The bootstrap issues a handful of sequential statements, so a small pool is plenty.
pub const DEFAULT_MIN_IDLE: u32 = 1;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 4;

// ============================================================================
// Schema Configuration
// ============================================================================

/// Schema the application tables live in and the listing is filtered by
pub const DEFAULT_SCHEMA: &str = "public";
