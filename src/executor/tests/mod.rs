//! Executor test suite
//!
//! Programs are constructed from the parser's JSON wire format and run on
//! a fresh VM per test.

mod helpers;

mod ai_tests;
mod basic_tests;
mod serialize_tests;
