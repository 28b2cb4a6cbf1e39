//! Integration tests for Booru-Harvester
//!
//! Each module drives the public API against wiremock servers.

mod pipeline_tests;
