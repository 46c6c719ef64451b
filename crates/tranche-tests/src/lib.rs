//! Scenario and invariant test suite for the Tranche ledger.
//!
//! The integration tests in `tests/` drive the ledger through the same
//! operations its collaborators use and compare the results against an
//! independent reference simulation of the compounding index.

pub mod helpers;
