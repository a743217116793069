//! Common test utilities and fixtures for the storekit-core test suite.
//!
//! Shared sample data, configurations, and the recording backend used
//! across integration, corruption, property-based, and stress tests.

pub mod fixtures;
