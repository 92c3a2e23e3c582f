//! Experiment drivers built on the scoring engine

pub mod certainty;
pub mod sweep;

pub use certainty::{score_certainty, CertaintyRecord, CertaintyRow, CertaintySummary};
pub use sweep::{position_sweep, PositionLockedRow};
