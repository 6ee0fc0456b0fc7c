use crate::results::TestResult;
use crate::sequence::{generate, SequenceConfig};
use crate::step::{Ear, TestStep, TestType};
use crate::threshold::extract_threshold;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One patient encounter: the generated protocol plus a cursor over it.
///
/// The cursor always points at a valid step unless the session is completed.
/// Once completed and finalized the session is read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    id: String,
    start_time: DateTime<Local>,
    patient_id: String,
    test_sequence: Vec<TestStep>,
    current_step: usize,
    completed: bool,
    results: Option<TestResult>,
}

/// Snapshot for display components
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub settled: usize,
    pub current_index: Option<usize>,
    pub is_complete: bool,
}

impl TestSession {
    pub fn new(patient_id: impl Into<String>, config: &SequenceConfig) -> Self {
        Self::with_start_time(patient_id, config, Local::now())
    }

    pub fn with_start_time(
        patient_id: impl Into<String>,
        config: &SequenceConfig,
        start_time: DateTime<Local>,
    ) -> Self {
        let test_sequence = generate(config);
        let completed = test_sequence.is_empty();
        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_time,
            patient_id: patient_id.into(),
            test_sequence,
            current_step: 0,
            completed,
            results: None,
        };
        log::info!(
            "session {} created for patient {} with {} steps",
            session.id,
            session.patient_id,
            session.test_sequence.len()
        );
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn steps(&self) -> &[TestStep] {
        &self.test_sequence
    }

    pub fn current_index(&self) -> usize {
        self.current_step
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn results(&self) -> Option<&TestResult> {
        self.results.as_ref()
    }

    /// The step under the cursor, or `None` once the session is over
    pub fn current_step(&self) -> Option<&TestStep> {
        if self.completed {
            return None;
        }
        self.test_sequence.get(self.current_step)
    }

    pub(crate) fn current_step_mut(&mut self) -> Option<&mut TestStep> {
        if self.completed {
            return None;
        }
        self.test_sequence.get_mut(self.current_step)
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.test_sequence.len(),
            settled: self.test_sequence.iter().filter(|s| s.is_completed()).count(),
            current_index: (!self.completed).then_some(self.current_step),
            is_complete: self.completed,
        }
    }

    /// Move past the current step after it settled. Completes the session when
    /// the cursor was on the last step.
    pub(crate) fn advance(&mut self) -> bool {
        if self.completed {
            return false;
        }
        if self.current_step + 1 < self.test_sequence.len() {
            self.current_step += 1;
            true
        } else {
            self.mark_completed();
            false
        }
    }

    pub(crate) fn mark_completed(&mut self) {
        if !self.completed {
            self.completed = true;
            log::info!("session {} completed", self.id);
        }
    }

    pub(crate) fn store_results(&mut self, result: TestResult) {
        self.results = Some(result);
    }

    /// Leave the current step unfinished and move to the next one. Skipping the
    /// last step ends the session.
    pub fn skip_forward(&mut self) -> Option<&TestStep> {
        if self.completed {
            return None;
        }
        log::debug!("skipping step {}", self.current_step);
        if self.advance() {
            self.move_to(self.current_step)
        } else {
            None
        }
    }

    /// Step back to revisit the previous point. Settled steps keep their
    /// status; only their displayed level is refreshed.
    pub fn go_back(&mut self) -> Option<&TestStep> {
        if self.completed || self.current_step == 0 {
            return None;
        }
        self.move_to(self.current_step - 1)
    }

    /// Jump to a frequency for an ear and conduction path, preferring an
    /// unsettled step when the protocol visits the frequency twice.
    pub fn jump_to(&mut self, frequency: u32, ear: Ear, test_type: TestType) -> Option<&TestStep> {
        if self.completed {
            return None;
        }
        let matches = |s: &&TestStep| {
            s.frequency() == frequency && s.ear() == ear && s.test_type() == test_type
        };
        let target = self
            .test_sequence
            .iter()
            .filter(matches)
            .find(|s| !s.is_completed())
            .or_else(|| self.test_sequence.iter().find(matches))
            .map(TestStep::id)?;
        let index = self.test_sequence.iter().position(|s| s.id() == target)?;
        self.move_to(index)
    }

    fn move_to(&mut self, index: usize) -> Option<&TestStep> {
        let step = self.test_sequence.get_mut(index)?;
        self.current_step = index;
        if step.is_completed() {
            if let Some(level) = extract_threshold(step).level {
                step.set_level(level);
            }
        }
        Some(&*step)
    }
}
