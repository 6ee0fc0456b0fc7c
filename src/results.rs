use crate::session::TestSession;
use crate::step::{Ear, ResponseStatus, TestPoint, TestStep, TestType};
use crate::threshold::{extract_threshold, REQUIRED_PRESENTATIONS};
use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// First presentations above this level are flagged as poor technique
pub const MAX_RECOMMENDED_START_LEVEL: i32 = 60;
/// Largest tolerated difference between the 1000 Hz test and its retest
pub const RETEST_TOLERANCE_DB: i32 = 5;
const RETEST_FREQUENCY: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub step_id: usize,
    pub frequency: u32,
    pub ear: Ear,
    pub test_type: TestType,
    pub level: Option<i32>,
    pub status: ResponseStatus,
    pub confirmed: bool,
}

impl ThresholdPoint {
    fn from_step(step: &TestStep) -> Self {
        let extracted = extract_threshold(step);
        Self {
            step_id: step.id(),
            frequency: step.frequency(),
            ear: step.ear(),
            test_type: step.test_type(),
            level: extracted.level,
            status: extracted.status,
            confirmed: extracted.confirmed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub session_id: String,
    pub patient_id: String,
    pub timestamp: DateTime<Local>,
    pub thresholds: Vec<ThresholdPoint>,
    /// Milliseconds between session start and finalization
    pub test_duration_ms: u64,
    pub technical_errors: Vec<String>,
}

impl TestResult {
    pub fn confirmed_count(&self) -> usize {
        self.thresholds.iter().filter(|t| t.confirmed).count()
    }
}

/// Advisory technique findings. They annotate a result, never block it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TechnicalError {
    SkippedFrequency(TestPoint),
    InsufficientResponses { point: TestPoint, responses: usize },
    StartingLevelTooHigh { point: TestPoint, level: i32 },
    RetestMismatch {
        ear: Ear,
        test_type: TestType,
        initial: i32,
        retest: i32,
    },
}

impl fmt::Display for TechnicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TechnicalError::SkippedFrequency(point) => {
                write!(f, "Skipped frequency: {}", point.label())
            }
            TechnicalError::InsufficientResponses { point, responses } => write!(
                f,
                "Insufficient responses at {}: {} of {} presentations",
                point.label(),
                responses,
                REQUIRED_PRESENTATIONS
            ),
            TechnicalError::StartingLevelTooHigh { point, level } => write!(
                f,
                "Starting level too high at {}: {} dB HL (max {})",
                point.label(),
                level,
                MAX_RECOMMENDED_START_LEVEL
            ),
            TechnicalError::RetestMismatch {
                ear,
                test_type,
                initial,
                retest,
            } => write!(
                f,
                "1000 Hz retest mismatch ({} {}): {} vs {} dB HL",
                ear, test_type, initial, retest
            ),
        }
    }
}

/// Run every technique check over the sequence
pub fn diagnose(steps: &[TestStep]) -> Vec<TechnicalError> {
    let mut errors = Vec::new();

    errors.extend(
        steps
            .iter()
            .filter(|s| {
                !s.is_completed() || s.response_status() == Some(ResponseStatus::NotTested)
            })
            .map(|s| TechnicalError::SkippedFrequency(*s.point())),
    );

    errors.extend(
        steps
            .iter()
            .filter(|s| {
                s.is_completed()
                    && s.response_status() != Some(ResponseStatus::NotTested)
                    && s.responses().len() < REQUIRED_PRESENTATIONS
            })
            .map(|s| TechnicalError::InsufficientResponses {
                point: *s.point(),
                responses: s.responses().len(),
            }),
    );

    errors.extend(steps.iter().filter_map(|s| {
        s.first_response()
            .filter(|ev| ev.level > MAX_RECOMMENDED_START_LEVEL)
            .map(|ev| TechnicalError::StartingLevelTooHigh {
                point: *s.point(),
                level: ev.level,
            })
    }));

    errors.extend(retest_mismatches(steps));
    errors
}

fn retest_mismatches(steps: &[TestStep]) -> Vec<TechnicalError> {
    steps
        .iter()
        .filter(|s| s.frequency() == RETEST_FREQUENCY)
        .map(|s| ((s.ear(), s.test_type()), extract_threshold(s)))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(key, _)| *key)
        .filter_map(|((ear, test_type), measured)| {
            let levels: Vec<i32> = measured
                .iter()
                .filter(|t| t.confirmed)
                .filter_map(|t| t.level)
                .collect();
            match levels.as_slice() {
                [initial, retest] if (initial - retest).abs() > RETEST_TOLERANCE_DB => {
                    Some(TechnicalError::RetestMismatch {
                        ear,
                        test_type,
                        initial: *initial,
                        retest: *retest,
                    })
                }
                _ => None,
            }
        })
        .collect()
}

/// Close the session and compute its result. A session that already carries a
/// result is returned unchanged.
pub fn finalize(session: &mut TestSession, now: DateTime<Local>) -> TestResult {
    if let Some(existing) = session.results() {
        return existing.clone();
    }

    let thresholds = session
        .steps()
        .iter()
        .map(ThresholdPoint::from_step)
        .collect();
    let technical_errors: Vec<String> = diagnose(session.steps())
        .iter()
        .map(ToString::to_string)
        .collect();
    for err in &technical_errors {
        log::debug!("session {}: {}", session.id(), err);
    }

    let test_duration_ms = (now - session.start_time())
        .num_milliseconds()
        .max(0) as u64;

    let result = TestResult {
        session_id: session.id().to_string(),
        patient_id: session.patient_id().to_string(),
        timestamp: now,
        thresholds,
        test_duration_ms,
        technical_errors,
    };

    session.mark_completed();
    session.store_results(result.clone());
    log::info!(
        "session {} finalized: {} thresholds, {} technical errors",
        result.session_id,
        result.thresholds.len(),
        result.technical_errors.len()
    );
    result
}
