//! Test suites for the daemon bootstrap and run loop.

mod support;
