// Virtual patients for practice sessions
//
// A profile holds the "true" hearing thresholds that a response oracle
// answers from. The threshold engine never looks at a profile; it only ever
// sees the yes/no the oracle produces.

use crate::sequence::{AIR_FREQUENCIES, BONE_FREQUENCIES};
use crate::staircase::Presentation;
use crate::step::{clamp_level, Ear, TestType};
use itertools::Itertools;
use rand::Rng;
use std::collections::HashMap;

/// Anything that decides whether the patient heard a presentation
pub trait ResponseOracle {
    fn responds(&mut self, presentation: &Presentation) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientProfile {
    pub id: String,
    thresholds: HashMap<(Ear, TestType, u32), i32>,
}

impl PatientProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thresholds: HashMap::new(),
        }
    }

    /// Same threshold at every frequency, both ears, both conduction paths
    pub fn uniform(id: impl Into<String>, level: i32) -> Self {
        let mut profile = Self::new(id);
        for ear in [Ear::Right, Ear::Left] {
            for &frequency in AIR_FREQUENCIES.iter().unique() {
                profile.set_threshold(ear, TestType::Air, frequency, level);
            }
            for &frequency in BONE_FREQUENCIES.iter().unique() {
                profile.set_threshold(ear, TestType::Bone, frequency, level);
            }
        }
        profile
    }

    pub fn with_threshold(mut self, ear: Ear, test_type: TestType, frequency: u32, level: i32) -> Self {
        self.set_threshold(ear, test_type, frequency, level);
        self
    }

    pub fn set_threshold(&mut self, ear: Ear, test_type: TestType, frequency: u32, level: i32) {
        self.thresholds
            .insert((ear, test_type, frequency), clamp_level(level));
    }

    pub fn threshold(&self, ear: Ear, test_type: TestType, frequency: u32) -> Option<i32> {
        self.thresholds.get(&(ear, test_type, frequency)).copied()
    }

    /// Draw a plausible audiogram: a per-ear base loss, a high-frequency
    /// slope, and sometimes a conductive component (air-bone gap).
    pub fn random<R: Rng>(id: impl Into<String>, rng: &mut R) -> Self {
        let mut profile = Self::new(id);
        for ear in [Ear::Right, Ear::Left] {
            let base = 5 * rng.gen_range(0..=10);
            let slope_per_octave = 5 * rng.gen_range(0..=3);
            let gap = if rng.gen_bool(0.3) {
                5 * rng.gen_range(2..=6)
            } else {
                0
            };

            for &frequency in AIR_FREQUENCIES.iter().unique() {
                let octaves_above_1k = match frequency {
                    2000 => 1,
                    4000 => 2,
                    8000 => 3,
                    _ => 0,
                };
                let jitter = 5 * rng.gen_range(-1..=1);
                let air = base + slope_per_octave * octaves_above_1k + jitter;
                profile.set_threshold(ear, TestType::Air, frequency, air);

                if BONE_FREQUENCIES.contains(&frequency) {
                    let bone = air - gap;
                    profile.set_threshold(ear, TestType::Bone, frequency, bone);
                }
            }
        }
        profile
    }
}

/// Responds exactly when the presented level reaches the true threshold
#[derive(Debug, Clone)]
pub struct ThresholdOracle {
    profile: PatientProfile,
}

impl ThresholdOracle {
    pub fn new(profile: PatientProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &PatientProfile {
        &self.profile
    }
}

impl ResponseOracle for ThresholdOracle {
    fn responds(&mut self, presentation: &Presentation) -> bool {
        self.profile
            .threshold(presentation.ear, presentation.test_type, presentation.frequency)
            .is_some_and(|threshold| presentation.level >= threshold)
    }
}
