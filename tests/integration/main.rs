//! Integration tests for the scan engine
//!
//! These tests serve a parent blog from wiremock and stand in fakes for
//! the completion providers and the extraction service, then drive whole
//! scans and sweeps through the public API.

mod scan_tests;
