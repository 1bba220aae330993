//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When the seeded catalog changes, update only this file.

// ============================================================================
// Seeded Catalog
// ============================================================================

/// Id of "Alien"
pub const MOVIE_1_ID: &str = "m1";
pub const MOVIE_1_TITLE: &str = "Alien";
pub const MOVIE_1_GENRE: &str = "SciFi";
pub const MOVIE_1_YEAR: i32 = 1979;

/// Id of "Heat"
pub const MOVIE_2_ID: &str = "m2";
pub const MOVIE_2_TITLE: &str = "Heat";
pub const MOVIE_2_GENRE: &str = "Crime";
pub const MOVIE_2_YEAR: i32 = 1995;

/// Id of "Arrival"
pub const MOVIE_3_ID: &str = "m3";
pub const MOVIE_3_TITLE: &str = "Arrival";
pub const MOVIE_3_GENRE: &str = "SciFi";
pub const MOVIE_3_YEAR: i32 = 2016;

/// Number of items every fresh test server starts with
pub const SEEDED_ITEMS: usize = 3;

// ============================================================================
// Test Assets
// ============================================================================

/// A minimal PNG header, enough for content sniffing
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52,
];

/// Upload limit configured on test servers (bytes)
pub const TEST_MAX_UPLOAD_BYTES: u64 = 64 * 1024;

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;
