// Library surface for the CLI, headless/integration tests and reuse.
// The threshold engine (sequence, step, session, staircase, threshold,
// results) has no I/O; everything else wraps it.
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod patient;
pub mod report;
pub mod results;
pub mod sequence;
pub mod session;
pub mod simulation;
pub mod staircase;
pub mod step;
pub mod threshold;

pub use error::{AudiosimError, Result};
pub use results::{finalize, TestResult, ThresholdPoint};
pub use sequence::SequenceConfig;
pub use session::TestSession;
pub use staircase::{Presentation, PresentationId, ResponseOutcome, StaircaseController};
pub use step::{Ear, ResponseEvent, ResponseStatus, TestPoint, TestStep, TestType};
