//! Integration test suite.
//!
//! 1. Walkthrough scenarios over a merged Account record set
//! 2. Record set, draft and search properties
//! 3. Change notifications over the in-memory push channel
//! 4. Adapter results that arrive after a mode change or teardown

pub mod interleaving_tests;
pub mod property_tests;
pub mod scenario_tests;
