//! flexkit-test-harness: Test utilities for flexkit.
//!
//! This crate provides [`MockRadio`], a scripted TCP peer that speaks the
//! line-oriented command/status protocol, for deterministic testing of
//! command channels and session contexts without real hardware.

pub mod mock_radio;

pub use mock_radio::MockRadio;
