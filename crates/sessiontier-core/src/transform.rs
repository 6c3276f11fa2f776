//! Value transforms applied to the snapshot before each solve.
//!
//! Transforms perturb session values so that placements are exercised under
//! changing conditions. They run under the data lock, after collection.

use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::config::{Config, DEFAULT_TRANSFORM};
use crate::model::OptimizationData;

/// In-place rewrite of session values.
pub trait Transform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn apply(&self, data: &mut OptimizationData);
}

/// With probability `probability` a session's value changes by ±10%, either
/// direction equally likely.
#[derive(Debug)]
pub struct RandomValueChange {
    name: &'static str,
    probability: f64,
    rng: Mutex<StdRng>,
}

impl RandomValueChange {
    const STANDARD_PROBABILITY: f64 = 0.10;
    const GREATER_PROBABILITY: f64 = 0.50;
    const FACTOR_UP: f64 = 1.1;
    const FACTOR_DOWN: f64 = 0.9;

    /// Occasional drift: 10% of sessions change per cycle.
    #[must_use]
    pub fn standard(seed: Option<u64>) -> Self {
        Self::with_probability("random-value-change", Self::STANDARD_PROBABILITY, seed)
    }

    /// Heavy drift: half of all sessions change per cycle.
    #[must_use]
    pub fn greater(seed: Option<u64>) -> Self {
        Self::with_probability("greater-random-value-change", Self::GREATER_PROBABILITY, seed)
    }

    fn with_probability(name: &'static str, probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            name,
            probability,
            rng: Mutex::new(rng),
        }
    }

    #[must_use]
    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl Transform for RandomValueChange {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, data: &mut OptimizationData) {
        let mut rng = self.rng.lock();
        for (_, props) in data.sessions_mut() {
            if rng.random::<f64>() < self.probability {
                props.value *= if rng.random::<f64>() < 0.5 {
                    Self::FACTOR_UP
                } else {
                    Self::FACTOR_DOWN
                };
            }
        }
    }
}

/// Leaves values untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChange;

impl Transform for NoChange {
    fn name(&self) -> &'static str {
        "none"
    }

    fn apply(&self, _data: &mut OptimizationData) {}
}

/// Known transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    RandomValueChange,
    GreaterRandomValueChange,
    None,
}

impl TransformKind {
    pub const ALL: [TransformKind; 3] = [
        TransformKind::RandomValueChange,
        TransformKind::GreaterRandomValueChange,
        TransformKind::None,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RandomValueChange => "random-value-change",
            Self::GreaterRandomValueChange => "greater-random-value-change",
            Self::None => "none",
        }
    }

    #[must_use]
    pub fn build(self, seed: Option<u64>) -> Box<dyn Transform> {
        match self {
            Self::RandomValueChange => Box::new(RandomValueChange::standard(seed)),
            Self::GreaterRandomValueChange => Box::new(RandomValueChange::greater(seed)),
            Self::None => Box::new(NoChange),
        }
    }
}

impl FromStr for TransformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown transform: {s}. Expected one of: random-value-change, greater-random-value-change, none"
                )
            })
    }
}

/// Resolve the configured transform chain; unknown names become the default transform.
#[must_use]
pub fn transforms_from_config(config: &Config) -> Vec<Box<dyn Transform>> {
    config
        .transforms
        .iter()
        .map(|name| {
            let kind = name.parse::<TransformKind>().unwrap_or_else(|err| {
                warn!(transform = %name, error = %err, fallback = DEFAULT_TRANSFORM, "unknown transform; using default");
                TransformKind::RandomValueChange
            });
            kind.build(None)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionProperties;

    fn data_with(n: usize, value: f64) -> OptimizationData {
        let mut data = OptimizationData::default();
        for i in 0..n {
            data.insert_session(format!("s{i:03}"), SessionProperties::new(value, 0));
        }
        data
    }

    #[test]
    fn values_only_move_by_ten_percent() {
        let mut data = data_with(200, 10.0);
        RandomValueChange::greater(Some(11)).apply(&mut data);
        let mut changed = 0;
        for (_, props) in data.sessions() {
            let v = props.value;
            assert!(
                (v - 10.0).abs() < 1e-9 || (v - 11.0).abs() < 1e-9 || (v - 9.0).abs() < 1e-9,
                "unexpected value {v}"
            );
            if (v - 10.0).abs() > 1e-9 {
                changed += 1;
            }
        }
        // half on average; generous bounds for a fixed seed
        assert!(changed > 50 && changed < 150, "changed {changed}");
    }

    #[test]
    fn standard_changes_fewer_sessions_than_greater() {
        let count = |transform: &dyn Transform| {
            let mut data = data_with(500, 1.0);
            transform.apply(&mut data);
            data.sessions().filter(|(_, p)| p.value != 1.0).count()
        };
        let standard = count(&RandomValueChange::standard(Some(5)));
        let greater = count(&RandomValueChange::greater(Some(5)));
        assert!(standard < greater, "{standard} >= {greater}");
    }

    #[test]
    fn none_leaves_values_alone() {
        let mut data = data_with(10, 3.0);
        NoChange.apply(&mut data);
        assert!(data.sessions().all(|(_, p)| p.value == 3.0));
    }

    #[test]
    fn registry_falls_back_to_default() {
        let mut config = Config::default();
        config.transforms = vec!["none".to_string(), "sine-wave".to_string()];
        let chain = transforms_from_config(&config);
        let names: Vec<&str> = chain.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["none", "random-value-change"]);
    }

    #[test]
    fn names_round_trip() {
        for kind in TransformKind::ALL {
            assert_eq!(kind.name().parse::<TransformKind>().unwrap(), kind);
            assert_eq!(kind.build(Some(1)).name(), kind.name());
        }
    }
}
