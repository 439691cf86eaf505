//! Fault policy resolution: policy parameters → per-field values.
//!
//! Walks the chain in shift order and fills every field from its
//! [`FieldBinding`].  Random masks are drawn from a single
//! [`FaultMaskGenerator`] seeded once from the policy, segment by segment
//! and field by field, so the result does not depend on how the caller
//! schedules anything else.

use crate::bits::BitString;
use crate::injectors::{FieldBinding, FieldLayout, SegmentLayout};
use crate::mask::FaultMaskGenerator;
use crate::policy::{FaultPolicy, PolicyError};
use crate::verified::bits::{difficulty_value, significant_bits};
use log::debug;

/// A field with its resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub name: &'static str,
    /// Exactly as wide as the field.
    pub value: BitString,
}

/// Resolved values for one segment, fields most significant first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSegment {
    pub name: String,
    pub position: usize,
    pub fields: Vec<ResolvedField>,
}

impl ResolvedSegment {
    /// Value of a named field.
    pub fn field(&self, name: &str) -> Option<&BitString> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

/// Resolve `policy` against every segment layout, in chain order.
///
/// The returned vector is parallel to `layouts`.
pub fn resolve(
    layouts: &[SegmentLayout],
    policy: &FaultPolicy,
) -> Result<Vec<ResolvedSegment>, PolicyError> {
    policy.validate()?;

    let mut masks = FaultMaskGenerator::new(policy.seed);
    let mut resolved = Vec::with_capacity(layouts.len());

    for layout in layouts {
        let fields = layout
            .fields
            .iter()
            .map(|field| {
                Ok(ResolvedField {
                    name: field.name,
                    value: resolve_field(layout, field, policy, &mut masks)?,
                })
            })
            .collect::<Result<Vec<_>, PolicyError>>()?;

        debug!(
            "resolved {} [{}] at position {}: {}",
            layout.name,
            layout.kind.tag(),
            layout.position,
            fields
                .iter()
                .map(|f| format!("{}={}", f.name, f.value))
                .collect::<Vec<_>>()
                .join(" ")
        );

        resolved.push(ResolvedSegment {
            name: layout.name.clone(),
            position: layout.position,
            fields,
        });
    }

    debug!(
        "fault-mask stream (seed {}) consumed {} draws",
        masks.seed(),
        masks.position()
    );
    Ok(resolved)
}

fn resolve_field(
    layout: &SegmentLayout,
    field: &FieldLayout,
    policy: &FaultPolicy,
    masks: &mut FaultMaskGenerator,
) -> Result<BitString, PolicyError> {
    let width = field.width as usize;
    match field.binding {
        FieldBinding::None => Ok(BitString::zeros(width)),
        FieldBinding::EnableOnProbability => Ok(flag(policy.probability > 0.0, width)),
        FieldBinding::EnableOnCycle => Ok(flag(policy.cycle > 0, width)),
        FieldBinding::Seed => fit_integer(layout, field, policy.seed),
        FieldBinding::Cycle => fit_integer(layout, field, policy.cycle),
        FieldBinding::CycleInjectAt => fit_integer(layout, field, policy.cycle_inject_at),
        FieldBinding::RandomMask => masks.next_mask(policy.probability, width),
        FieldBinding::Difficulty => {
            // registers wider than 64 bits carry the 64-bit threshold
            let value = difficulty_value(policy.probability, field.width.min(64)).ok_or(
                PolicyError::ProbabilityOutOfRange {
                    probability: policy.probability,
                },
            )?;
            Ok(BitString::from_u64(value, width))
        }
        FieldBinding::Mask => fit_bits(layout, field, &policy.mask),
        FieldBinding::StuckAtValue => fit_bits(layout, field, &policy.stuck_at_value),
    }
}

fn flag(enabled: bool, width: usize) -> BitString {
    BitString::from_u64(enabled as u64, width)
}

fn parameter(field: &FieldLayout) -> &'static str {
    field.binding.parameter().unwrap_or("value")
}

fn fit_integer(
    layout: &SegmentLayout,
    field: &FieldLayout,
    value: u64,
) -> Result<BitString, PolicyError> {
    if significant_bits(value) > field.width {
        return Err(PolicyError::ValueOutOfRange {
            segment: layout.name.clone(),
            field: field.name,
            parameter: parameter(field),
            value,
            field_width: field.width,
        });
    }
    Ok(BitString::from_u64(value, field.width as usize))
}

fn fit_bits(
    layout: &SegmentLayout,
    field: &FieldLayout,
    value: &BitString,
) -> Result<BitString, PolicyError> {
    value
        .fit_to(field.width as usize)
        .ok_or_else(|| PolicyError::ValueTooWide {
            segment: layout.name.clone(),
            field: field.name,
            parameter: parameter(field),
            field_width: field.width,
            value_width: value.significant_width(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injectors::InjectorKind;
    use crate::mask::generate;
    use crate::policy::FaultPolicyBuilder;
    use crate::topology::{ChainSegment, ChainTopology};

    fn layouts(kinds: &[InjectorKind]) -> Vec<SegmentLayout> {
        let segments = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| ChainSegment::new(format!("seg{i}"), i, k.clone()))
            .collect();
        ChainTopology::new("main", segments)
            .unwrap()
            .segments()
            .iter()
            .map(|s| s.layout().unwrap())
            .collect()
    }

    fn hex(text: &str) -> BitString {
        BitString::from_hex(text).unwrap()
    }

    #[test]
    fn pass_through_is_zero() {
        let policy = FaultPolicyBuilder::new()
            .probability(1.0)
            .mask(hex("ff"))
            .build()
            .unwrap();
        let resolved = resolve(&layouts(&[InjectorKind::pass_through(16)]), &policy).unwrap();
        assert!(resolved[0].field("data").unwrap().is_all_zero());
        assert_eq!(resolved[0].field("data").unwrap().width(), 16);
    }

    #[test]
    fn lfsr_fields() {
        let policy = FaultPolicyBuilder::new().probability(0.5).seed(0).build().unwrap();
        let resolved = resolve(&layouts(&[InjectorKind::lfsr(32)]), &policy).unwrap();
        let seg = &resolved[0];
        assert_eq!(seg.field("enable").unwrap().to_u64(), Some(1));
        assert_eq!(seg.field("seed").unwrap().to_u64(), Some(0));
        assert_eq!(seg.field("mask").unwrap(), &generate(0, 0.5, 32).unwrap());
    }

    #[test]
    fn lfsr_disabled_at_zero_probability() {
        let policy = FaultPolicy::default();
        let resolved = resolve(&layouts(&[InjectorKind::lfsr(32)]), &policy).unwrap();
        assert_eq!(resolved[0].field("enable").unwrap().to_u64(), Some(0));
        assert!(resolved[0].field("mask").unwrap().is_all_zero());
    }

    #[test]
    fn lfsr_difficulty_tracks_probability() {
        let kind = InjectorKind::LfsrInjector {
            width: 8,
            enable: 1,
            seed: 32,
            mask: 8,
            difficulty: 8,
        };
        let policy = FaultPolicyBuilder::new().probability(1.0).build().unwrap();
        let resolved = resolve(&layouts(&[kind]), &policy).unwrap();
        assert_eq!(resolved[0].field("difficulty").unwrap().to_u64(), Some(0xff));
    }

    #[test]
    fn seed_must_fit_seed_field() {
        let policy = FaultPolicyBuilder::new().seed(1 << 40).build().unwrap();
        let err = resolve(&layouts(&[InjectorKind::lfsr(8)]), &policy).unwrap_err();
        assert_eq!(
            err,
            PolicyError::ValueOutOfRange {
                segment: "seg0".into(),
                field: "seed",
                parameter: "seed",
                value: 1 << 40,
                field_width: 32,
            }
        );
    }

    #[test]
    fn stuck_at_truncates_leading_zeros() {
        let policy = FaultPolicyBuilder::new()
            .mask(hex("00000000FFFFFFFF"))
            .stuck_at(hex("00000000DEADBEEF"))
            .build()
            .unwrap();
        let resolved = resolve(&layouts(&[InjectorKind::stuck_at(32)]), &policy).unwrap();
        assert_eq!(resolved[0].field("mask").unwrap().to_u64(), Some(0xffff_ffff));
        assert_eq!(resolved[0].field("value").unwrap().to_u64(), Some(0xdead_beef));
        assert_eq!(resolved[0].field("value").unwrap().width(), 32);
    }

    #[test]
    fn stuck_at_rejects_wide_value() {
        let policy = FaultPolicyBuilder::new()
            .stuck_at(hex("1ff"))
            .build()
            .unwrap();
        let err = resolve(&layouts(&[InjectorKind::stuck_at(8)]), &policy).unwrap_err();
        assert_eq!(
            err,
            PolicyError::ValueTooWide {
                segment: "seg0".into(),
                field: "value",
                parameter: "stuck_at_value",
                field_width: 8,
                value_width: 9,
            }
        );
    }

    #[test]
    fn cycle_injector_fields() {
        let policy = FaultPolicyBuilder::new()
            .cycle(1)
            .cycle_inject_at(7)
            .build()
            .unwrap();
        let resolved = resolve(&layouts(&[InjectorKind::cycle(32)]), &policy).unwrap();
        assert_eq!(resolved[0].field("enable").unwrap().to_u64(), Some(1));
        assert_eq!(resolved[0].field("cycle_count").unwrap().to_u64(), Some(1));
        assert_eq!(resolved[0].field("inject_at").unwrap().to_u64(), Some(7));
    }

    #[test]
    fn heterogeneous_chain_isolates_parameters() {
        let policy = FaultPolicyBuilder::new()
            .mask(hex("0f"))
            .probability(1.0)
            .build()
            .unwrap();
        let resolved = resolve(
            &layouts(&[
                InjectorKind::stuck_at(8),
                InjectorKind::cycle(8),
                InjectorKind::lfsr(8),
            ]),
            &policy,
        )
        .unwrap();
        assert_eq!(resolved[0].field("mask").unwrap().to_u64(), Some(0x0f));
        assert_eq!(resolved[1].field("enable").unwrap().to_u64(), Some(0));
        assert!(resolved[2].field("mask").unwrap().is_all_one());
    }

    #[test]
    fn second_lfsr_continues_stream() {
        let policy = FaultPolicyBuilder::new().probability(0.5).seed(4).build().unwrap();
        let resolved = resolve(
            &layouts(&[InjectorKind::lfsr(32), InjectorKind::lfsr(32)]),
            &policy,
        )
        .unwrap();
        let mut gen = FaultMaskGenerator::new(4);
        assert_eq!(resolved[0].field("mask").unwrap(), &gen.next_mask(0.5, 32).unwrap());
        assert_eq!(resolved[1].field("mask").unwrap(), &gen.next_mask(0.5, 32).unwrap());
    }

    #[test]
    fn invalid_policy_rejected_before_resolution() {
        let policy = FaultPolicy {
            probability: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            resolve(&layouts(&[InjectorKind::pass_through(1)]), &policy),
            Err(PolicyError::ProbabilityOutOfRange { .. })
        ));
    }
}
