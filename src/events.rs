use crate::session::TestSession;
use crate::staircase::{PresentationId, ResponseOutcome, StaircaseController};
use crate::step::{Ear, TestType};

/// Everything a trainer's console or a patient button can do to a running
/// session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Patient answer for a presentation. `adjust = false` records the answer
    /// without moving the level.
    Response {
        presentation: PresentationId,
        responded: bool,
        adjust: bool,
    },
    SetLevel(i32),
    /// No response at the audiometer's limit: close the step and move on
    MarkNoResponse,
    SkipForward,
    GoBack,
    JumpTo {
        frequency: u32,
        ear: Ear,
        test_type: TestType,
    },
}

/// Apply one event. Only responses produce an outcome.
pub fn dispatch(
    controller: &mut StaircaseController,
    session: &mut TestSession,
    event: SessionEvent,
) -> Option<ResponseOutcome> {
    match event {
        SessionEvent::Response {
            presentation,
            responded,
            adjust: true,
        } => controller.record_response(session, presentation, responded),
        SessionEvent::Response {
            presentation,
            responded,
            adjust: false,
        } => controller.record_response_without_adjustment(session, presentation, responded),
        SessionEvent::SetLevel(level) => {
            controller.set_current_level(session, level);
            None
        }
        SessionEvent::MarkNoResponse => {
            controller.mark_no_response(session);
            None
        }
        SessionEvent::SkipForward => {
            session.skip_forward();
            None
        }
        SessionEvent::GoBack => {
            session.go_back();
            None
        }
        SessionEvent::JumpTo {
            frequency,
            ear,
            test_type,
        } => {
            session.jump_to(frequency, ear, test_type);
            None
        }
    }
}
