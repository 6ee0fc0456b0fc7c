// Threshold validation - the 2-of-3 rule
//
// Every answer here is recomputed from a step's full response history. The
// level cursor is never consulted, so a manual level change after a threshold
// has been confirmed cannot move the stored result.

use crate::step::{ResponseEvent, ResponseStatus, TestStep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Presentations needed at one level before it can qualify
pub const REQUIRED_PRESENTATIONS: usize = 3;
/// Responses needed among those presentations
pub const REQUIRED_RESPONSES: usize = 2;

/// Presentations and responses observed at a single level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelTally {
    pub total: usize,
    pub heard: usize,
}

impl LevelTally {
    pub fn meets_criterion(&self) -> bool {
        self.total >= REQUIRED_PRESENTATIONS && self.heard >= REQUIRED_RESPONSES
    }
}

/// Group a response history by level, softest level first
pub fn tally_levels(responses: &[ResponseEvent]) -> BTreeMap<i32, LevelTally> {
    responses.iter().fold(BTreeMap::new(), |mut map, ev| {
        let tally: &mut LevelTally = map.entry(ev.level).or_default();
        tally.total += 1;
        if ev.responded {
            tally.heard += 1;
        }
        map
    })
}

pub fn is_threshold_established(step: &TestStep) -> bool {
    step.responses().len() >= REQUIRED_PRESENTATIONS
        && tally_levels(step.responses())
            .values()
            .any(LevelTally::meets_criterion)
}

/// Result of reading a threshold out of a step's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedThreshold {
    /// `None` only for steps that were never presented
    pub level: Option<i32>,
    pub status: ResponseStatus,
    /// True when the level met the full 2-of-3 rule; false for the
    /// best-effort fallback
    pub confirmed: bool,
}

/// Softest level that satisfies 2-of-3.
///
/// Without one, fall back to the softest level heard at least twice, then to
/// the loudest level tried (as `no_response`). A step closed as `no_response`
/// skips the first fallback. An empty history is `not_tested`.
pub fn extract_threshold(step: &TestStep) -> ExtractedThreshold {
    let tallies = tally_levels(step.responses());

    if let Some((&level, _)) = tallies.iter().find(|(_, t)| t.meets_criterion()) {
        return ExtractedThreshold {
            level: Some(level),
            status: ResponseStatus::Threshold,
            confirmed: true,
        };
    }

    let heard_twice = tallies
        .iter()
        .find(|(_, t)| t.heard >= REQUIRED_RESPONSES)
        .filter(|_| step.response_status() != Some(ResponseStatus::NoResponse));
    if let Some((&level, _)) = heard_twice {
        return ExtractedThreshold {
            level: Some(level),
            status: ResponseStatus::Threshold,
            confirmed: false,
        };
    }

    match tallies.keys().next_back() {
        Some(&loudest) => ExtractedThreshold {
            level: Some(loudest),
            status: ResponseStatus::NoResponse,
            confirmed: false,
        },
        None => ExtractedThreshold {
            level: None,
            status: ResponseStatus::NotTested,
            confirmed: false,
        },
    }
}

/// Answer to "may this step's threshold be stored yet?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdValidation {
    pub is_valid: bool,
    pub level: Option<i32>,
    pub reason: Option<String>,
}

/// Check a step before its threshold is stored. Not converging yet is a normal
/// state of the protocol, so this never fails; it says why instead.
pub fn validate_for_storage(step: &TestStep) -> ThresholdValidation {
    let count = step.responses().len();
    if count < REQUIRED_PRESENTATIONS {
        return ThresholdValidation {
            is_valid: false,
            level: None,
            reason: Some(format!(
                "insufficient responses: {} of {} required",
                count, REQUIRED_PRESENTATIONS
            )),
        };
    }

    let extracted = extract_threshold(step);
    if extracted.confirmed {
        ThresholdValidation {
            is_valid: true,
            level: extracted.level,
            reason: None,
        }
    } else {
        ThresholdValidation {
            is_valid: false,
            level: None,
            reason: Some(format!(
                "no level has {} responses out of {} presentations yet",
                REQUIRED_RESPONSES, REQUIRED_PRESENTATIONS
            )),
        }
    }
}
