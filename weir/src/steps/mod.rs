//! Step implementations, grouped by kind.
//!
//! Each kind is a named group of version-tagged implementation units: one
//! `version_<major>_<minor>_<patch>` module per version, exactly one
//! implementation per unit, aggregated into the kind's version table.

pub mod end;
pub mod filter;
pub mod python;
pub mod read;
pub mod save;
