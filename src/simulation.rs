use crate::events::{dispatch, SessionEvent};
use crate::patient::ResponseOracle;
use crate::session::TestSession;
use crate::staircase::{ResponseOutcome, StaircaseController};
use crate::step::MAX_LEVEL;

/// Counters from an automatic run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub presentations: usize,
    pub thresholds: usize,
    /// Steps closed after a miss at the audiometer's limit
    pub no_response: usize,
    /// Steps abandoned after hitting the per-step presentation cap
    pub abandoned: usize,
}

/// Play the whole protocol against an oracle, one presentation at a time.
///
/// A miss at the loudest level closes the step as `no_response`. A step that
/// has not converged after `max_presentations_per_step` is left unfinished and
/// the cursor moves on, so it surfaces later as a skipped frequency.
pub fn simulate<O: ResponseOracle>(
    session: &mut TestSession,
    controller: &mut StaircaseController,
    oracle: &mut O,
    max_presentations_per_step: usize,
) -> SimulationStats {
    let mut stats = SimulationStats::default();
    let mut on_step = 0usize;

    while let Some(presentation) = controller.present(session) {
        if on_step >= max_presentations_per_step {
            log::info!(
                "giving up on step {} after {} presentations",
                presentation.step_index,
                on_step
            );
            stats.abandoned += 1;
            on_step = 0;
            dispatch(controller, session, SessionEvent::SkipForward);
            continue;
        }

        let responded = oracle.responds(&presentation);
        stats.presentations += 1;
        on_step += 1;

        let answer = SessionEvent::Response {
            presentation: presentation.id,
            responded,
            adjust: true,
        };
        match dispatch(controller, session, answer) {
            Some(ResponseOutcome::Recorded {
                threshold: Some(_), ..
            }) => {
                stats.thresholds += 1;
                on_step = 0;
            }
            Some(ResponseOutcome::Recorded { .. })
                if !responded && presentation.level == MAX_LEVEL =>
            {
                dispatch(controller, session, SessionEvent::MarkNoResponse);
                stats.no_response += 1;
                on_step = 0;
            }
            Some(ResponseOutcome::StepSettled { .. }) => {
                on_step = 0;
                dispatch(controller, session, SessionEvent::SkipForward);
            }
            Some(_) => {}
            None => break,
        }
    }

    stats
}
