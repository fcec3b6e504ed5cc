//! The decay engine: turns an edge's `base_weight` plus an elapsed distance
//! (wall-clock age or hop count) into a scalar weight in `[0, peakWeight]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Edge;

/// One step of wall-clock decay, chosen as a day: the decay shapes operate
/// on an abstract step count `x`, and ingestion transcripts are a session
/// granularity that moves on the order of days, not seconds.
const STEP_DURATION_SECS: f64 = 86_400.0;

/// One tier of a `multi-linear` decay curve: contributes `initial` at `x=0`,
/// holds flat for `hold_steps`, then decays linearly at `decay_per_step`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Tier {
    pub initial: f64,
    pub hold_steps: f64,
    pub decay_per_step: f64,
}

impl Tier {
    fn contribution(&self, x: f64) -> f64 {
        if x <= self.hold_steps {
            self.initial
        } else if self.decay_per_step <= 0.0 {
            self.initial
        } else {
            (self.initial - self.decay_per_step * (x - self.hold_steps)).max(0.0)
        }
    }

    /// Smallest `x` at which this tier's own contribution falls to zero.
    fn zero_point(&self) -> f64 {
        if self.decay_per_step <= 0.0 {
            f64::INFINITY
        } else {
            self.hold_steps + self.initial / self.decay_per_step
        }
    }
}

/// Tagged variant over the supported decay shapes, each a non-increasing
/// function `f(x) in [0, 1]` of a distance `x` (time steps or hop count).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum DecayShape {
    Exponential { weight_per_step: f64 },
    Linear { decay_per_step: f64 },
    DelayedLinear { hold_steps: f64, decay_per_step: f64 },
    MultiLinear { tiers: Vec<Tier> },
}

impl DecayShape {
    /// `f(x)`, clamped to `[0, 1]`.
    pub fn weight(&self, x: f64) -> f64 {
        let x = x.max(0.0);
        let raw = match self {
            DecayShape::Exponential { weight_per_step } => weight_per_step.powf(x),
            DecayShape::Linear { decay_per_step } => 1.0 - decay_per_step * x,
            DecayShape::DelayedLinear {
                hold_steps,
                decay_per_step,
            } => {
                if x <= *hold_steps {
                    1.0
                } else {
                    1.0 - decay_per_step * (x - hold_steps)
                }
            }
            DecayShape::MultiLinear { tiers } => {
                tiers.iter().map(|t| t.contribution(x)).sum::<f64>()
            }
        };
        raw.clamp(0.0, 1.0)
    }

    /// Maximum value the curve attains, i.e. `f(0)` for every shape here.
    pub fn peak_weight(&self) -> f64 {
        self.weight(0.0)
    }

    /// Smallest `x` such that `f(x) <= min_weight`, solved analytically.
    pub fn death_point(&self, min_weight: f64) -> f64 {
        match self {
            DecayShape::Exponential { weight_per_step } => {
                if *weight_per_step <= 0.0 || *weight_per_step >= 1.0 || min_weight <= 0.0 {
                    f64::INFINITY
                } else {
                    (min_weight.ln() / weight_per_step.ln()).max(0.0)
                }
            }
            DecayShape::Linear { decay_per_step } => {
                if *decay_per_step <= 0.0 {
                    f64::INFINITY
                } else {
                    ((1.0 - min_weight) / decay_per_step).max(0.0)
                }
            }
            DecayShape::DelayedLinear {
                hold_steps,
                decay_per_step,
            } => {
                if *decay_per_step <= 0.0 {
                    f64::INFINITY
                } else {
                    hold_steps + (1.0 - min_weight) / decay_per_step
                }
            }
            DecayShape::MultiLinear { tiers } => {
                // Piecewise: evaluate at every tier's own zero point and a
                // coarse upper bound, then bisect for the crossing of
                // min_weight. The sum is piecewise-linear and non-increasing,
                // so bisection converges exactly to machine precision.
                let upper = tiers
                    .iter()
                    .map(Tier::zero_point)
                    .filter(|z| z.is_finite())
                    .fold(0.0_f64, f64::max)
                    .max(1.0);
                if self.weight(upper) > min_weight {
                    return f64::INFINITY;
                }
                let mut lo = 0.0_f64;
                let mut hi = upper;
                for _ in 0..100 {
                    let mid = (lo + hi) / 2.0;
                    if self.weight(mid) > min_weight {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                hi
            }
        }
    }
}

/// An edge is alive while its decayed weight exceeds `min_weight`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecayConfig {
    pub shape: DecayShape,
    pub min_weight: f64,
}

impl DecayConfig {
    pub fn is_alive(&self, base_weight: f64, x: f64) -> bool {
        base_weight * self.shape.weight(x) > self.min_weight
    }

    pub fn weight(&self, base_weight: f64, x: f64) -> f64 {
        base_weight * self.shape.weight(x)
    }
}

/// An edge paired with its decayed weight, ready for traversal.
#[derive(Debug, Clone)]
pub struct WeightedEdge {
    pub edge: Edge,
    pub weight: f64,
}

/// Age of an edge at `now`, expressed in decay steps (days).
pub fn age_in_steps(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_seconds() as f64 / STEP_DURATION_SECS
}

/// Applies the decay engine to every edge using wall-clock age at `now`,
/// dropping dead edges and sorting the survivors by weight descending —
/// the contract `getWeightedEdges` exposes over the relational store.
pub fn weighted_edges(edges: Vec<Edge>, now: DateTime<Utc>, config: &DecayConfig) -> Vec<WeightedEdge> {
    let mut out: Vec<WeightedEdge> = edges
        .into_iter()
        .filter_map(|edge| {
            let x = age_in_steps(edge.created_at, now).max(0.0);
            let weight = config.weight(edge.base_weight, x);
            if weight > config.min_weight {
                Some(WeightedEdge { edge, weight })
            } else {
                None
            }
        })
        .collect();
    out.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn exponential_matches_spec_scenario_s3() {
        let shape = DecayShape::Exponential { weight_per_step: 0.5 };
        assert!(approx(shape.weight(3.0), 0.125, 1e-9));
        assert!(approx(shape.death_point(0.1), 3.321928, 1e-4));
    }

    #[test]
    fn decay_is_monotonically_non_increasing() {
        let shapes = vec![
            DecayShape::Exponential { weight_per_step: 0.7 },
            DecayShape::Linear { decay_per_step: 0.1 },
            DecayShape::DelayedLinear { hold_steps: 2.0, decay_per_step: 0.2 },
            DecayShape::MultiLinear {
                tiers: vec![
                    Tier { initial: 0.6, hold_steps: 1.0, decay_per_step: 0.1 },
                    Tier { initial: 0.4, hold_steps: 3.0, decay_per_step: 0.05 },
                ],
            },
        ];
        for shape in shapes {
            let mut prev = shape.weight(0.0);
            for step in 1..200 {
                let cur = shape.weight(step as f64 * 0.25);
                assert!(cur <= prev + 1e-12, "{:?} not monotone at step {step}", shape);
                prev = cur;
            }
        }
    }

    #[test]
    fn decay_bounds_hold() {
        let shapes = vec![
            DecayShape::Exponential { weight_per_step: 0.5 },
            DecayShape::Linear { decay_per_step: 0.3 },
            DecayShape::DelayedLinear { hold_steps: 1.0, decay_per_step: 0.4 },
        ];
        for shape in shapes {
            let peak = shape.peak_weight();
            assert!(peak <= 1.0 + 1e-12);
            for step in 0..100 {
                let w = shape.weight(step as f64 * 0.1);
                assert!((0.0..=peak + 1e-12).contains(&w));
            }
        }
    }

    #[test]
    fn delayed_linear_holds_then_decays() {
        let shape = DecayShape::DelayedLinear { hold_steps: 2.0, decay_per_step: 0.5 };
        assert_eq!(shape.weight(0.0), 1.0);
        assert_eq!(shape.weight(2.0), 1.0);
        assert!(shape.weight(3.0) < 1.0);
    }

    #[test]
    fn multi_linear_sums_tier_contributions_at_origin() {
        let shape = DecayShape::MultiLinear {
            tiers: vec![
                Tier { initial: 0.6, hold_steps: 0.0, decay_per_step: 0.1 },
                Tier { initial: 0.3, hold_steps: 0.0, decay_per_step: 0.1 },
            ],
        };
        assert!(approx(shape.weight(0.0), 0.9, 1e-9));
    }

    #[test]
    fn decay_config_is_alive_respects_min_weight() {
        let cfg = DecayConfig {
            shape: DecayShape::Exponential { weight_per_step: 0.5 },
            min_weight: 0.1,
        };
        assert!(cfg.is_alive(1.0, 0.0));
        assert!(!cfg.is_alive(1.0, 10.0));
    }

    #[test]
    fn weighted_edges_drops_dead_and_sorts_by_weight_desc() {
        use crate::models::{EdgeDirection, EdgeType};

        let now = Utc::now();
        let fresh = Edge {
            source_chunk_id: "a".into(),
            target_chunk_id: "b".into(),
            direction: EdgeDirection::Forward,
            edge_type: EdgeType::Continuation,
            base_weight: 1.0,
            created_at: now,
            vector_clock_delta: Some(1),
        };
        let mut stale = fresh.clone();
        stale.target_chunk_id = "c".into();
        stale.created_at = now - chrono::Duration::days(1000);
        stale.edge_type = EdgeType::TopicShift;
        stale.base_weight = EdgeType::TopicShift.default_weight();

        let config = DecayConfig {
            shape: DecayShape::Exponential { weight_per_step: 0.5 },
            min_weight: 0.1,
        };
        let result = weighted_edges(vec![stale, fresh], now, &config);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].edge.target_chunk_id, "b");
    }

    #[test]
    fn age_in_steps_is_zero_for_simultaneous_timestamps() {
        let now = Utc::now();
        assert_eq!(age_in_steps(now, now), 0.0);
    }
}
