//! Provider adapter integration tests.

#[cfg(feature = "amazon_ses")]
#[path = "adapters/amazon_ses_test.rs"]
mod amazon_ses_test;
#[cfg(feature = "local")]
#[path = "adapters/local_test.rs"]
mod local_test;
#[path = "adapters/logger_test.rs"]
mod logger_test;
