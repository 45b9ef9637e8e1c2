//! # rollsign-cli
//!
//! Command-line front end for `rollsign-core`.
//!
//! - **Issue** (default): new key pair, updated roster, one QR image per
//!   code and the public roster page
//! - **Verify**: check a scanned payload against the published key
//! - **Output formats**: pretty text or JSON run reports

pub mod cli;
pub mod output;

pub use cli::run;
