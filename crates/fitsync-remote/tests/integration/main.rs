//! Integration tests for fitsync-remote
//!
//! Uses wiremock to simulate the backend table API and the reachability
//! endpoint.

mod common;

mod test_probe;
mod test_remote_store;
