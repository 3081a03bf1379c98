//! Tandem Testkit
//!
//! Test doubles for the tandem crates. [`StubEngine`] stands in for the
//! external MPC primitive so driver, registry and recovery tests run without
//! cryptography.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod engine;
pub mod fixtures;

pub use engine::{
    high_s_compact, StubConfig, StubContext, StubEngine, StubHandle, StubKeypair,
    DEFAULT_STUB_KEY, HIGH_S_DER, RAW_SIGNATURE,
};
pub use fixtures::{
    device_keypair, init_test_tracing, sample_artifacts, FailingShareStorage,
};
