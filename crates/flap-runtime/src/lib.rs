pub mod clock;
pub mod config;
pub mod error;
pub mod plan;
pub mod process;
pub mod rotation;
pub mod session;
pub mod sink;
pub mod supervisor;

pub use clock::{ClockSource, SessionClock};
pub use config::Config;
pub use error::{Error, Result, SpawnError};
pub use plan::{PlanOptions, Target, plan_tracers};
pub use process::{LaunchOptions, TracerProcess};
pub use rotation::RotatingWriter;
pub use session::{SessionOutcome, TraceSession};
pub use sink::{CaptureFile, CaptureMode, LineSink, OutputSink};
pub use supervisor::{
    CancelHandle, Completion, ShutdownReport, StartOutcome, SupervisorConfig, TierReport,
    TracerSupervisor,
};
