use crate::step::{clamp_level, Ear, TestPoint, TestStep, TestType, DEFAULT_STARTING_LEVEL};
use serde::{Deserialize, Serialize};

/// Air conduction order: start at 1000 Hz, go up, retest 1000 Hz, then go down
pub const AIR_FREQUENCIES: [u32; 7] = [1000, 2000, 4000, 8000, 1000, 500, 250];
/// Bone conduction uses the same pattern without 8000 Hz
pub const BONE_FREQUENCIES: [u32; 6] = [1000, 2000, 4000, 1000, 500, 250];

const EAR_ORDER: [Ear; 2] = [Ear::Right, Ear::Left];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub include_air: bool,
    pub include_bone: bool,
    pub starting_level: i32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            include_air: true,
            include_bone: true,
            starting_level: DEFAULT_STARTING_LEVEL,
        }
    }
}

impl SequenceConfig {
    fn frequencies(&self, test_type: TestType) -> &'static [u32] {
        match test_type {
            TestType::Air if self.include_air => &AIR_FREQUENCIES,
            TestType::Bone if self.include_bone => &BONE_FREQUENCIES,
            _ => &[],
        }
    }
}

/// Build the full protocol: right ear before left, air before bone within an
/// ear. Ids run monotonically across the whole sequence.
pub fn generate(config: &SequenceConfig) -> Vec<TestStep> {
    let starting_level = clamp_level(config.starting_level);

    EAR_ORDER
        .iter()
        .flat_map(|&ear| {
            [TestType::Air, TestType::Bone]
                .into_iter()
                .flat_map(move |test_type| {
                    config
                        .frequencies(test_type)
                        .iter()
                        .map(move |&frequency| (frequency, ear, test_type))
                })
        })
        .enumerate()
        .map(|(id, (frequency, ear, test_type))| {
            TestStep::new(
                TestPoint {
                    id,
                    frequency,
                    ear,
                    test_type,
                },
                starting_level,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(steps: &[TestStep]) -> Vec<(u32, Ear, TestType)> {
        steps
            .iter()
            .map(|s| (s.frequency(), s.ear(), s.test_type()))
            .collect()
    }

    #[test]
    fn full_sequence_layout() {
        let steps = generate(&SequenceConfig::default());
        assert_eq!(steps.len(), 2 * (AIR_FREQUENCIES.len() + BONE_FREQUENCIES.len()));

        let cond = conditions(&steps);
        assert_eq!(cond[0], (1000, Ear::Right, TestType::Air));
        assert_eq!(cond[6], (250, Ear::Right, TestType::Air));
        assert_eq!(cond[7], (1000, Ear::Right, TestType::Bone));
        assert_eq!(cond[12], (250, Ear::Right, TestType::Bone));
        assert_eq!(cond[13], (1000, Ear::Left, TestType::Air));
        assert_eq!(cond[25], (250, Ear::Left, TestType::Bone));
    }

    #[test]
    fn ids_are_monotonic() {
        let steps = generate(&SequenceConfig::default());
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.id(), i);
        }
    }

    #[test]
    fn air_order_includes_retest() {
        let config = SequenceConfig {
            include_bone: false,
            ..SequenceConfig::default()
        };
        let steps = generate(&config);
        let right: Vec<u32> = steps
            .iter()
            .filter(|s| s.ear() == Ear::Right)
            .map(|s| s.frequency())
            .collect();
        assert_eq!(right, AIR_FREQUENCIES.to_vec());

        // initial and retest share content, differ only by id
        assert!(steps[0].point().same_condition(steps[4].point()));
        assert_ne!(steps[0].id(), steps[4].id());
    }

    #[test]
    fn bone_never_exceeds_4000() {
        let config = SequenceConfig {
            include_air: false,
            ..SequenceConfig::default()
        };
        let steps = generate(&config);
        assert_eq!(steps.len(), 2 * BONE_FREQUENCIES.len());
        assert!(steps.iter().all(|s| s.test_type() == TestType::Bone));
        assert!(steps.iter().all(|s| (250..=4000).contains(&s.frequency())));
        assert_eq!(steps[0].ear(), Ear::Right);
    }

    #[test]
    fn nothing_enabled_is_empty() {
        let config = SequenceConfig {
            include_air: false,
            include_bone: false,
            ..SequenceConfig::default()
        };
        assert!(generate(&config).is_empty());
    }

    #[test]
    fn starting_level_applied_and_clamped() {
        let steps = generate(&SequenceConfig::default());
        assert!(steps.iter().all(|s| s.current_level() == 40));
        assert!(steps.iter().all(|s| s.responses().is_empty() && !s.is_completed()));

        let config = SequenceConfig {
            starting_level: 200,
            ..SequenceConfig::default()
        };
        assert!(generate(&config).iter().all(|s| s.current_level() == 120));
    }

    #[test]
    fn deterministic() {
        let config = SequenceConfig::default();
        assert_eq!(generate(&config), generate(&config));
    }
}
