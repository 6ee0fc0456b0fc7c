// Staircase controller - Hughson-Westlake level adjustment
//
// Down 10 dB after every response. Up 10 dB while the step is still seeking
// (fewer than two presentations recorded before this one), up 5 dB once it is
// bracketing. After each adjustment the step is checked against the 2-of-3
// rule; a confirmed step is settled and the cursor moves on.
//
// Every stimulus carries a PresentationId. The controller remembers the
// highest id it has applied, so a response delivered twice (for example by a
// key press and a button click for the same tone) lands in the history once.
// It also remembers which step and level each unanswered id was played at: an
// answer is recorded at the level the tone was played, and only on that step.

use crate::session::TestSession;
use crate::step::{Ear, ResponseStatus, TestStep, TestType};
use crate::threshold::{extract_threshold, is_threshold_established};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Presentations after which a step stops seeking and starts bracketing
pub const SEEKING_PRESENTATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StaircaseState {
    Seeking,
    Bracketing,
    Confirmed,
}

/// (state, responded) -> level change in dB
const TRANSITIONS: [(StaircaseState, bool, i32); 6] = [
    (StaircaseState::Seeking, true, -10),
    (StaircaseState::Seeking, false, 10),
    (StaircaseState::Bracketing, true, -10),
    (StaircaseState::Bracketing, false, 5),
    (StaircaseState::Confirmed, true, -10),
    (StaircaseState::Confirmed, false, 5),
];

impl StaircaseState {
    /// State of a step given everything recorded so far
    pub fn of(step: &TestStep) -> Self {
        if is_threshold_established(step) {
            StaircaseState::Confirmed
        } else if step.responses().len() < SEEKING_PRESENTATIONS {
            StaircaseState::Seeking
        } else {
            StaircaseState::Bracketing
        }
    }

    pub fn adjustment(self, responded: bool) -> i32 {
        TRANSITIONS
            .iter()
            .find(|(state, heard, _)| *state == self && *heard == responded)
            .map(|(_, _, delta)| *delta)
            .unwrap_or(0)
    }
}

/// Identifier attached to one physical stimulus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PresentationId(pub u64);

impl fmt::Display for PresentationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the audiometer should play next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub id: PresentationId,
    pub step_index: usize,
    pub frequency: u32,
    pub ear: Ear,
    pub test_type: TestType,
    pub level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Recorded {
        step_index: usize,
        /// Level the answered tone was played at
        level_before: i32,
        level_after: i32,
        /// State the step was in when the response arrived
        state: StaircaseState,
        /// Set when this response confirmed the step's threshold
        threshold: Option<i32>,
        session_completed: bool,
    },
    /// The presentation id was already applied
    Duplicate(PresentationId),
    /// The presentation belongs to a step the cursor has since left, or was
    /// never issued by this controller
    Stale(PresentationId),
    /// The active step was already settled; its history stays as it is
    StepSettled { step_index: usize },
}

impl ResponseOutcome {
    pub fn was_recorded(&self) -> bool {
        matches!(self, ResponseOutcome::Recorded { .. })
    }
}

#[derive(Debug, Default, Clone)]
pub struct StaircaseController {
    last_issued: Option<PresentationId>,
    last_applied: Option<PresentationId>,
    /// Issued and not yet answered, oldest first
    outstanding: BTreeMap<PresentationId, Presentation>,
}

impl StaircaseController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied(&self) -> Option<PresentationId> {
        self.last_applied
    }

    /// Issue the next stimulus for the active step
    pub fn present(&mut self, session: &TestSession) -> Option<Presentation> {
        let step = session.current_step()?;
        let id = PresentationId(self.last_issued.map_or(1, |PresentationId(n)| n + 1));
        let presentation = Presentation {
            id,
            step_index: session.current_index(),
            frequency: step.frequency(),
            ear: step.ear(),
            test_type: step.test_type(),
            level: step.current_level(),
        };
        self.last_issued = Some(id);
        self.outstanding.insert(id, presentation);
        Some(presentation)
    }

    /// Record a response and move the level (automatic mode)
    pub fn record_response(
        &mut self,
        session: &mut TestSession,
        presentation: PresentationId,
        responded: bool,
    ) -> Option<ResponseOutcome> {
        self.record(session, presentation, responded, true)
    }

    /// Record a response but leave the level where it is. Used when a trainer
    /// drives the level by hand.
    pub fn record_response_without_adjustment(
        &mut self,
        session: &mut TestSession,
        presentation: PresentationId,
        responded: bool,
    ) -> Option<ResponseOutcome> {
        self.record(session, presentation, responded, false)
    }

    /// Override the active step's level. History and settlement are untouched.
    pub fn set_current_level(&mut self, session: &mut TestSession, level: i32) -> Option<i32> {
        let index = session.current_index();
        let step = session.current_step_mut()?;
        let applied = step.set_level(level);
        log::debug!("step {} level overridden to {} dB", index, applied);
        Some(applied)
    }

    /// Close the active step without a threshold, for a patient who gives no
    /// response at the audiometer's limit. A step that never got an answer is
    /// closed as not tested. Settled steps are left alone.
    pub fn mark_no_response(&mut self, session: &mut TestSession) -> Option<ResponseStatus> {
        let step = session.current_step_mut()?;
        let status = if step.responses().is_empty() {
            ResponseStatus::NotTested
        } else {
            ResponseStatus::NoResponse
        };
        if !step.settle(status) {
            return None;
        }
        log::info!("{} closed as {}", step.point().label(), status);
        session.advance();
        Some(status)
    }

    fn consume(&mut self, presentation: PresentationId) {
        self.last_applied = Some(presentation);
        self.outstanding.retain(|id, _| *id > presentation);
    }

    fn record(
        &mut self,
        session: &mut TestSession,
        presentation: PresentationId,
        responded: bool,
        adjust: bool,
    ) -> Option<ResponseOutcome> {
        let step_index = session.current_index();
        if session.current_step().is_none() {
            log::warn!(
                "response for presentation {} ignored: no active step",
                presentation
            );
            return None;
        }

        if self.last_applied.is_some_and(|last| presentation <= last) {
            log::warn!("presentation {} already applied, ignoring", presentation);
            return Some(ResponseOutcome::Duplicate(presentation));
        }

        let Some(played) = self.outstanding.get(&presentation).copied() else {
            log::warn!("presentation {} was never issued, ignoring", presentation);
            return Some(ResponseOutcome::Stale(presentation));
        };

        if played.step_index != step_index {
            log::warn!(
                "presentation {} was for step {}, active step is {}; ignoring",
                presentation,
                played.step_index,
                step_index
            );
            self.consume(presentation);
            return Some(ResponseOutcome::Stale(presentation));
        }

        let step = session.current_step_mut()?;
        if step.is_completed() {
            log::debug!(
                "step {} already settled, presentation {} not recorded",
                step_index,
                presentation
            );
            return Some(ResponseOutcome::StepSettled { step_index });
        }

        let state = StaircaseState::of(step);
        let level_before = played.level;
        step.push_response(level_before, responded);
        self.consume(presentation);

        let level_after = if adjust {
            step.set_level(level_before + state.adjustment(responded))
        } else {
            step.current_level()
        };
        log::debug!(
            "step {} ({}): {} at {} dB -> {} dB [{}]",
            step_index,
            step.point().label(),
            if responded { "heard" } else { "no response" },
            level_before,
            level_after,
            state
        );

        let threshold = if is_threshold_established(step) {
            let level = extract_threshold(step).level;
            step.settle(ResponseStatus::Threshold);
            log::info!(
                "threshold confirmed for {} at {:?} dB HL",
                step.point().label(),
                level
            );
            level
        } else {
            None
        };

        let session_completed = if threshold.is_some() {
            !session.advance()
        } else {
            false
        };

        Some(ResponseOutcome::Recorded {
            step_index,
            level_before,
            level_after,
            state,
            threshold,
            session_completed,
        })
    }
}
