use assert_matches::assert_matches;
use audiosim::patient::{PatientProfile, ResponseOracle, ThresholdOracle};
use audiosim::staircase::StaircaseState;
use audiosim::threshold::{extract_threshold, validate_for_storage};
use audiosim::{
    finalize, Ear, ResponseOutcome, ResponseStatus, SequenceConfig, StaircaseController,
    TestSession, TestType,
};
use chrono::Local;

fn air_only() -> SequenceConfig {
    SequenceConfig {
        include_bone: false,
        ..SequenceConfig::default()
    }
}

/// Present the active step once and answer with `responded`
fn answer(
    ctl: &mut StaircaseController,
    session: &mut TestSession,
    responded: bool,
) -> ResponseOutcome {
    let p = ctl.present(session).expect("active step");
    ctl.record_response(session, p.id, responded)
        .expect("response applied")
}

#[test]
fn scenario_a_descends_brackets_and_confirms() {
    let mut session = TestSession::new("scenario-a", &air_only());
    let mut ctl = StaircaseController::new();

    // (presented level, answer, level afterwards, state at the time)
    let trace = [
        (40, true, 30, StaircaseState::Seeking),
        (30, true, 20, StaircaseState::Seeking),
        (20, true, 10, StaircaseState::Bracketing),
        (10, false, 15, StaircaseState::Bracketing),
        (15, true, 5, StaircaseState::Bracketing),
        (5, false, 10, StaircaseState::Bracketing),
        (10, true, 0, StaircaseState::Bracketing),
    ];
    for (before, responded, after, expected_state) in trace {
        let outcome = answer(&mut ctl, &mut session, responded);
        assert_matches!(
            outcome,
            ResponseOutcome::Recorded { level_before, level_after, state, threshold: None, .. }
                if level_before == before && level_after == after && state == expected_state
        );
    }

    let step = session.current_step().expect("still on first step");
    assert_eq!(step.id(), 0);
    assert!(!validate_for_storage(step).is_valid);

    // The trainer re-presents 10 dB by hand
    assert_eq!(ctl.set_current_level(&mut session, 10), Some(10));
    let outcome = answer(&mut ctl, &mut session, true);
    assert_matches!(
        outcome,
        ResponseOutcome::Recorded {
            step_index: 0,
            threshold: Some(10),
            session_completed: false,
            ..
        }
    );

    let first = &session.steps()[0];
    assert!(first.is_completed());
    assert_eq!(first.response_status(), Some(ResponseStatus::Threshold));
    assert_eq!(extract_threshold(first).level, Some(10));
    assert_eq!(session.current_index(), 1);
}

#[test]
fn scenario_a_automatic_oracle_lands_on_true_threshold() {
    let mut session = TestSession::new("scenario-a", &air_only());
    let mut ctl = StaircaseController::new();
    let mut oracle = ThresholdOracle::new(PatientProfile::uniform("p", 15));

    while session.current_index() == 0 && !session.is_completed() {
        let p = ctl.present(&session).expect("active step");
        let heard = oracle.responds(&p);
        ctl.record_response(&mut session, p.id, heard);
    }

    let step = &session.steps()[0];
    let extracted = extract_threshold(step);
    assert_eq!(extracted.level, Some(15));
    assert!(extracted.confirmed);
    assert_eq!(step.responses().len(), 11);
}

#[test]
fn scenario_b_untested_and_unresponsive_steps() {
    let mut session = TestSession::new("scenario-b", &air_only());
    let mut ctl = StaircaseController::new();

    // Nothing is ever heard on the first step; the level climbs to the ceiling
    for _ in 0..30 {
        answer(&mut ctl, &mut session, false);
    }
    let step = session.current_step().expect("step never settles");
    assert_eq!(step.id(), 0);
    assert_eq!(step.current_level(), 120);
    session.skip_forward();

    let result = finalize(&mut session, Local::now());
    let first = &result.thresholds[0];
    assert_eq!(first.status, ResponseStatus::NoResponse);
    assert_eq!(first.level, Some(120));
    assert!(!first.confirmed);

    let second = &result.thresholds[1];
    assert_eq!(second.status, ResponseStatus::NotTested);
    assert_eq!(second.level, None);

    assert!(result
        .technical_errors
        .iter()
        .any(|e| e == "Skipped frequency: 1000 Hz right air"));
}

#[test]
fn scenario_c_retest_matches_initial_measurement() {
    let mut session = TestSession::new("scenario-c", &SequenceConfig::default());
    let mut ctl = StaircaseController::new();
    let profile = PatientProfile::uniform("p", 25)
        .with_threshold(Ear::Left, TestType::Bone, 1000, 35)
        .with_threshold(Ear::Right, TestType::Air, 2000, 50);
    let mut oracle = ThresholdOracle::new(profile);

    while let Some(p) = ctl.present(&session) {
        let heard = oracle.responds(&p);
        ctl.record_response(&mut session, p.id, heard);
    }

    assert!(session.is_completed());
    for ear in [Ear::Right, Ear::Left] {
        for test_type in [TestType::Air, TestType::Bone] {
            let levels: Vec<i32> = session
                .steps()
                .iter()
                .filter(|s| s.frequency() == 1000 && s.ear() == ear && s.test_type() == test_type)
                .filter_map(|s| extract_threshold(s).level)
                .collect();
            assert_eq!(levels.len(), 2, "{} {}", ear, test_type);
            assert!((levels[0] - levels[1]).abs() <= 5);
        }
    }

    let result = finalize(&mut session, Local::now());
    assert_eq!(result.confirmed_count(), result.thresholds.len());
    assert!(result.technical_errors.is_empty());
}

#[test]
fn settled_step_history_survives_revisits() {
    let mut session = TestSession::new("nav", &air_only());
    let mut ctl = StaircaseController::new();
    let mut oracle = ThresholdOracle::new(PatientProfile::uniform("p", 15));

    while session.current_index() == 0 {
        let p = ctl.present(&session).expect("active step");
        let heard = oracle.responds(&p);
        ctl.record_response(&mut session, p.id, heard);
    }
    let history = session.steps()[0].responses().to_vec();

    let revisited = session.go_back().expect("first step");
    assert!(revisited.is_completed());
    assert_eq!(revisited.current_level(), 15);

    // Further answers on a settled step are refused, not recorded
    let p = ctl.present(&session).expect("cursor on settled step");
    assert_matches!(
        ctl.record_response(&mut session, p.id, false),
        Some(ResponseOutcome::StepSettled { step_index: 0 })
    );
    assert_eq!(session.steps()[0].responses(), history.as_slice());
    assert_eq!(
        session.steps()[0].response_status(),
        Some(ResponseStatus::Threshold)
    );

    let next = session
        .jump_to(1000, Ear::Right, TestType::Air)
        .expect("retest step");
    assert_eq!(next.id(), 4);
    assert!(!next.is_completed());
}

#[test]
fn responses_after_completion_are_ignored() {
    let config = SequenceConfig {
        include_air: false,
        include_bone: false,
        ..SequenceConfig::default()
    };
    let mut session = TestSession::new("empty", &config);
    let mut ctl = StaircaseController::new();

    assert!(session.is_completed());
    assert!(ctl.present(&session).is_none());
    assert_eq!(
        ctl.record_response(&mut session, audiosim::PresentationId(1), true),
        None
    );
    assert_eq!(ctl.set_current_level(&mut session, 30), None);

    let result = finalize(&mut session, Local::now());
    assert!(result.thresholds.is_empty());
    assert!(result.technical_errors.is_empty());
}
