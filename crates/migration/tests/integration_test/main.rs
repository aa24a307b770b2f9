//! Integration tests for bulkcopy-migration.
//!
//! Every test drives the public engine against the in-memory fakes from
//! `bulkcopy_migration::testing`; none of them needs AWS credentials.

mod common;
mod dry_run;
mod manifest_discovery;
mod run_flow;
