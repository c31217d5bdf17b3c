/// Round loop, winner selection, and the private aggregate.
pub mod coordinator;
/// Run summary computed after steering.
pub mod kpi;
/// Day-ahead target profiles.
pub mod schedule;
pub mod types;

pub use coordinator::{Coordinator, select_winner};
pub use kpi::SteeringReport;
pub use schedule::DayAheadSchedule;
pub use types::{Horizon, RoundRecord, StopReason};
