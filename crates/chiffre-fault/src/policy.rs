//! Fault policy: the global parameters of one injection run.
//!
//! A [`FaultPolicy`] is applied to every segment in the chain, but each
//! parameter only reaches fields whose [`FieldBinding`](crate::injectors::FieldBinding)
//! consumes it.  Segments with no matching field keep their all-zero
//! default, so one policy can target several injector kinds at once.

use crate::bits::BitString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from validating or applying a policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("probability {probability} outside [0, 1]")]
    ProbabilityOutOfRange { probability: f64 },

    #[error(
        "segment {segment:?} field {field:?}: {parameter} needs {value_width} bits but the field is {field_width} bits wide"
    )]
    ValueTooWide {
        segment: String,
        field: &'static str,
        parameter: &'static str,
        field_width: u32,
        value_width: usize,
    },

    #[error("segment {segment:?} field {field:?}: {parameter} = {value} does not fit in {field_width} bits")]
    ValueOutOfRange {
        segment: String,
        field: &'static str,
        parameter: &'static str,
        value: u64,
        field_width: u32,
    },
}

/// Global fault parameters for one compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPolicy {
    /// Stuck-at select mask.
    pub mask: BitString,
    /// Stuck-at forced value.
    pub stuck_at_value: BitString,
    /// Per-bit trigger probability for LFSR injectors.
    pub probability: f64,
    /// Seed for the fault-mask stream and LFSR seed registers.
    pub seed: u64,
    /// Cycle count for cycle injectors (0 = disabled).
    pub cycle: u64,
    /// Cycle at which cycle injectors fire.
    pub cycle_inject_at: u64,
}

impl Default for FaultPolicy {
    /// An inert policy: nothing enabled, all values zero.
    fn default() -> Self {
        Self {
            mask: BitString::default(),
            stuck_at_value: BitString::default(),
            probability: 0.0,
            seed: 0,
            cycle: 0,
            cycle_inject_at: 0,
        }
    }
}

impl FaultPolicy {
    /// Check parameters that do not depend on the topology.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(PolicyError::ProbabilityOutOfRange {
                probability: self.probability,
            });
        }
        Ok(())
    }

    /// Parse a policy from JSON; bit strings are hex text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Builder for constructing validated policies.
///
/// # Example
///
/// ```
/// use chiffre_fault::bits::BitString;
/// use chiffre_fault::policy::FaultPolicyBuilder;
///
/// let policy = FaultPolicyBuilder::new()
///     .mask(BitString::from_hex("00000000ffffffff").unwrap())
///     .stuck_at(BitString::from_hex("00000000deadbeef").unwrap())
///     .seed(0)
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.probability, 0.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FaultPolicyBuilder {
    policy: FaultPolicy,
}

impl FaultPolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mask(mut self, mask: BitString) -> Self {
        self.policy.mask = mask;
        self
    }

    pub fn stuck_at(mut self, value: BitString) -> Self {
        self.policy.stuck_at_value = value;
        self
    }

    pub fn probability(mut self, probability: f64) -> Self {
        self.policy.probability = probability;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.policy.seed = seed;
        self
    }

    pub fn cycle(mut self, cycle: u64) -> Self {
        self.policy.cycle = cycle;
        self
    }

    pub fn cycle_inject_at(mut self, cycle_inject_at: u64) -> Self {
        self.policy.cycle_inject_at = cycle_inject_at;
        self
    }

    /// Validate and return the policy.
    pub fn build(self) -> Result<FaultPolicy, PolicyError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_inert() {
        let policy = FaultPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.mask.significant_width(), 0);
        assert_eq!(policy.cycle, 0);
    }

    #[test]
    fn builder_rejects_bad_probability() {
        let err = FaultPolicyBuilder::new().probability(1.5).build().unwrap_err();
        assert_eq!(err, PolicyError::ProbabilityOutOfRange { probability: 1.5 });
        assert!(FaultPolicyBuilder::new().probability(f64::NAN).build().is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let policy = FaultPolicyBuilder::new()
            .probability(0.5)
            .seed(3)
            .cycle(1)
            .cycle_inject_at(7)
            .build()
            .unwrap();
        assert_eq!(policy.seed, 3);
        assert_eq!(policy.cycle, 1);
        assert_eq!(policy.cycle_inject_at, 7);
    }

    #[test]
    fn json_with_partial_fields() {
        let policy = FaultPolicy::from_json(
            r#"{ "mask": "00000000ffffffff", "probability": 0.25, "seed": 11 }"#,
        )
        .unwrap();
        assert_eq!(policy.mask.width(), 64);
        assert_eq!(policy.probability, 0.25);
        assert_eq!(policy.seed, 11);
        assert_eq!(policy.stuck_at_value, BitString::default());
    }

    #[test]
    fn default_policy_json_round_trip() {
        let json = serde_json::to_string(&FaultPolicy::default()).unwrap();
        assert_eq!(FaultPolicy::from_json(&json).unwrap(), FaultPolicy::default());
    }

    #[test]
    fn populated_policy_json_round_trip() {
        let policy = FaultPolicyBuilder::new()
            .mask(BitString::from_hex("00000000ffffffff").unwrap())
            .stuck_at(BitString::from_hex("deadbeef").unwrap())
            .probability(0.125)
            .seed(7)
            .cycle(3)
            .cycle_inject_at(11)
            .build()
            .unwrap();
        let json = serde_json::to_string_pretty(&policy).unwrap();
        assert_eq!(FaultPolicy::from_json(&json).unwrap(), policy);
    }

    #[test]
    fn json_rejects_bad_hex() {
        assert!(FaultPolicy::from_json(r#"{ "mask": "xyz" }"#).is_err());
    }

    #[test]
    fn error_messages_name_the_field() {
        let err = PolicyError::ValueTooWide {
            segment: "reg_cycle".into(),
            field: "mask",
            parameter: "mask",
            field_width: 32,
            value_width: 40,
        };
        let msg = err.to_string();
        assert!(msg.contains("reg_cycle"));
        assert!(msg.contains("40 bits"));
        assert!(msg.contains("32 bits"));
    }
}
