use serde::{Deserialize, Serialize};

/// Softest level the audiometer can present (dB HL)
pub const MIN_LEVEL: i32 = -10;
/// Loudest level the audiometer can present (dB HL)
pub const MAX_LEVEL: i32 = 120;
/// Attenuator resolution
pub const LEVEL_STEP: i32 = 5;
pub const DEFAULT_STARTING_LEVEL: i32 = 40;

/// Clamp a level into the audiometer range and snap it onto the 5 dB grid.
///
/// Off-grid values round to the nearest grid point, ties going up.
pub fn clamp_level(level: i32) -> i32 {
    let step = i64::from(LEVEL_STEP);
    let snapped = (i64::from(level) + step / 2).div_euclid(step) * step;
    snapped.clamp(i64::from(MIN_LEVEL), i64::from(MAX_LEVEL)) as i32
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Ear {
    Right,
    Left,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TestType {
    Air,
    Bone,
}

/// Where a step sits in the protocol. Two points may share the same content
/// (the 1000 Hz retest); `id` is what tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPoint {
    pub id: usize,
    pub frequency: u32,
    pub ear: Ear,
    pub test_type: TestType,
}

impl TestPoint {
    /// Same frequency, ear and conduction path, ignoring `id`
    pub fn same_condition(&self, other: &TestPoint) -> bool {
        self.frequency == other.frequency
            && self.ear == other.ear
            && self.test_type == other.test_type
    }

    pub fn label(&self) -> String {
        format!("{} Hz {} {}", self.frequency, self.ear, self.test_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub level: i32,
    pub responded: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponseStatus {
    Threshold,
    NoResponse,
    NotTested,
}

/// One test point plus everything recorded for it.
///
/// `responses` is append-only and `completed`/`response_status` are write-once;
/// only the engine in this crate can touch them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    #[serde(flatten)]
    point: TestPoint,
    current_level: i32,
    responses: Vec<ResponseEvent>,
    completed: bool,
    response_status: Option<ResponseStatus>,
}

impl TestStep {
    pub fn new(point: TestPoint, starting_level: i32) -> Self {
        Self {
            point,
            current_level: clamp_level(starting_level),
            responses: Vec::new(),
            completed: false,
            response_status: None,
        }
    }

    pub fn point(&self) -> &TestPoint {
        &self.point
    }

    pub fn id(&self) -> usize {
        self.point.id
    }

    pub fn frequency(&self) -> u32 {
        self.point.frequency
    }

    pub fn ear(&self) -> Ear {
        self.point.ear
    }

    pub fn test_type(&self) -> TestType {
        self.point.test_type
    }

    pub fn current_level(&self) -> i32 {
        self.current_level
    }

    pub fn responses(&self) -> &[ResponseEvent] {
        &self.responses
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// `None` until the step has been settled one way or another
    pub fn response_status(&self) -> Option<ResponseStatus> {
        self.response_status
    }

    pub fn first_response(&self) -> Option<&ResponseEvent> {
        self.responses.first()
    }

    pub(crate) fn set_level(&mut self, level: i32) -> i32 {
        self.current_level = clamp_level(level);
        self.current_level
    }

    pub(crate) fn shift_level(&mut self, delta: i32) -> i32 {
        self.set_level(self.current_level + delta)
    }

    /// Append an answer to a tone played at `level`. The cursor is not moved.
    pub(crate) fn push_response(&mut self, level: i32, responded: bool) -> ResponseEvent {
        let event = ResponseEvent {
            level: clamp_level(level),
            responded,
        };
        self.responses.push(event);
        event
    }

    /// Marks the step settled. A step that is already settled keeps its
    /// first status.
    pub(crate) fn settle(&mut self, status: ResponseStatus) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.response_status = Some(status);
        true
    }
}
