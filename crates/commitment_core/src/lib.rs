pub mod domain;
pub mod error;
pub mod manager;
pub mod ports;
pub mod recap;
pub mod schedule;
pub mod windows;

pub use domain::{Commitment, Completion, Confidence, CycleType, Proof, ProofAnalysis, Recurrence};
pub use error::CommitmentError;
pub use manager::{CommitmentManager, ListFilter, RecurrenceSpec};
pub use ports::{CommitmentStore, OcrService, PortError, PortResult, VerificationService};
pub use recap::{build_report, CommitmentRecap, DayStatus, RecapAggregator, RecapReport, UserRecap};
pub use windows::{CycleWindow, WindowCalculator, WindowMode, DAY_BOUNDARY_HOUR};
