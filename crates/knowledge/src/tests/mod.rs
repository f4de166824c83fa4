//! End-to-end pipeline tests with in-crate test doubles.

mod support;
