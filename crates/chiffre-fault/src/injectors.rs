//! Injector type registry.
//!
//! Every scan-chain segment carries an [`InjectorKind`].  The kind alone
//! decides which sub-fields the segment holds, how wide each one is, and
//! which [`FaultPolicy`](crate::policy::FaultPolicy) parameter (if any)
//! fills it.  The resolver and serializer only ever look at the
//! [`FieldBinding`]s returned here, so adding a kind touches this file and
//! nothing downstream.

use crate::topology::TopologyError;
use std::collections::BTreeMap;
use std::fmt;

/// The fault model implemented by a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InjectorKind {
    /// No injection; the segment shifts data through unmodified.
    PassThrough {
        /// Width of the shadowed register.
        width: u32,
    },

    /// Probabilistic bit flips driven by a seeded pseudo-random mask.
    LfsrInjector {
        /// Width of the shadowed register.
        width: u32,
        /// Enable flag width.
        enable: u32,
        /// Hardware LFSR seed width.
        seed: u32,
        /// Flip mask width.
        mask: u32,
        /// Trigger threshold width (0 = no difficulty register).
        difficulty: u32,
    },

    /// Force selected bits to a fixed value.
    StuckAt {
        /// Width of the shadowed register.
        width: u32,
        /// Select mask width.
        mask: u32,
        /// Forced value width.
        value: u32,
    },

    /// Fire only within an execution-cycle window.
    CycleInjector {
        /// Width of the shadowed register.
        width: u32,
        /// Enable flag width.
        enable: u32,
        /// Cycle counter width.
        cycle_count: u32,
        /// Inject-at width.
        inject_at: u32,
    },
}

/// What fills a field at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldBinding {
    /// Not driven by the policy; stays zero.
    None,
    /// `1` when the policy probability is non-zero.
    EnableOnProbability,
    /// `1` when the policy cycle is non-zero.
    EnableOnCycle,
    /// The policy seed.
    Seed,
    /// Next mask from the compilation's fault-mask stream.
    RandomMask,
    /// Probability scaled to the field width.
    Difficulty,
    /// The policy stuck-at mask.
    Mask,
    /// The policy stuck-at value.
    StuckAtValue,
    /// The policy cycle count.
    Cycle,
    /// The policy cycle-inject-at value.
    CycleInjectAt,
}

impl FieldBinding {
    /// Name of the policy parameter this binding reads, if any.
    pub fn parameter(&self) -> Option<&'static str> {
        match self {
            FieldBinding::None => None,
            FieldBinding::EnableOnProbability
            | FieldBinding::RandomMask
            | FieldBinding::Difficulty => Some("probability"),
            FieldBinding::EnableOnCycle | FieldBinding::Cycle => Some("cycle"),
            FieldBinding::Seed => Some("seed"),
            FieldBinding::Mask => Some("mask"),
            FieldBinding::StuckAtValue => Some("stuck_at_value"),
            FieldBinding::CycleInjectAt => Some("cycle_inject_at"),
        }
    }
}

/// A named sub-field declared by an injector kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub width: u32,
    pub binding: FieldBinding,
}

impl FieldSpec {
    const fn new(name: &'static str, width: u32, binding: FieldBinding) -> Self {
        Self {
            name,
            width,
            binding,
        }
    }
}

impl InjectorKind {
    /// Kind tags accepted in topology descriptors.
    pub const TAGS: [&'static str; 4] = ["pass-through", "lfsr", "stuck-at", "cycle"];

    pub fn pass_through(width: u32) -> Self {
        InjectorKind::PassThrough { width }
    }

    /// LFSR injector with a 1-bit enable, 32-bit seed, full-width mask
    /// and no difficulty register.
    pub fn lfsr(width: u32) -> Self {
        InjectorKind::LfsrInjector {
            width,
            enable: 1,
            seed: 32,
            mask: width,
            difficulty: 0,
        }
    }

    /// Stuck-at injector with full-width mask and value.
    pub fn stuck_at(width: u32) -> Self {
        InjectorKind::StuckAt {
            width,
            mask: width,
            value: width,
        }
    }

    /// Cycle injector with a 1-bit enable and 32-bit cycle registers.
    pub fn cycle(width: u32) -> Self {
        InjectorKind::CycleInjector {
            width,
            enable: 1,
            cycle_count: 32,
            inject_at: 32,
        }
    }

    /// Width of the shadowed register.
    pub fn width(&self) -> u32 {
        match self {
            InjectorKind::PassThrough { width }
            | InjectorKind::LfsrInjector { width, .. }
            | InjectorKind::StuckAt { width, .. }
            | InjectorKind::CycleInjector { width, .. } => *width,
        }
    }

    /// Descriptor tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            InjectorKind::PassThrough { .. } => "pass-through",
            InjectorKind::LfsrInjector { .. } => "lfsr",
            InjectorKind::StuckAt { .. } => "stuck-at",
            InjectorKind::CycleInjector { .. } => "cycle",
        }
    }

    /// Sub-fields in scan order, most significant first.
    ///
    /// Zero-width optional fields are omitted.
    pub fn fields(&self) -> Vec<FieldSpec> {
        let fields = match *self {
            InjectorKind::PassThrough { width } => {
                vec![FieldSpec::new("data", width, FieldBinding::None)]
            }
            InjectorKind::LfsrInjector {
                enable,
                seed,
                mask,
                difficulty,
                ..
            } => vec![
                FieldSpec::new("enable", enable, FieldBinding::EnableOnProbability),
                FieldSpec::new("seed", seed, FieldBinding::Seed),
                FieldSpec::new("mask", mask, FieldBinding::RandomMask),
                FieldSpec::new("difficulty", difficulty, FieldBinding::Difficulty),
            ],
            InjectorKind::StuckAt { mask, value, .. } => vec![
                FieldSpec::new("mask", mask, FieldBinding::Mask),
                FieldSpec::new("value", value, FieldBinding::StuckAtValue),
            ],
            InjectorKind::CycleInjector {
                enable,
                cycle_count,
                inject_at,
                ..
            } => vec![
                FieldSpec::new("enable", enable, FieldBinding::EnableOnCycle),
                FieldSpec::new("cycle_count", cycle_count, FieldBinding::Cycle),
                FieldSpec::new("inject_at", inject_at, FieldBinding::CycleInjectAt),
            ],
        };
        fields.into_iter().filter(|f| f.width > 0).collect()
    }

    /// Sum of all sub-field widths.
    pub fn fields_width(&self) -> u64 {
        self.fields().iter().map(|f| f.width as u64).sum()
    }

    /// Build a kind from a descriptor tag and field-width overrides.
    ///
    /// `params` may set `width` and any field name the kind declares;
    /// anything else is rejected.
    pub fn from_params(
        segment: &str,
        tag: &str,
        params: &BTreeMap<String, u32>,
    ) -> Result<Self, TopologyError> {
        let width = params
            .get("width")
            .copied()
            .ok_or_else(|| TopologyError::MissingWidth {
                segment: segment.to_string(),
            })?;

        let mut kind = match tag {
            "pass-through" => Self::pass_through(width),
            "lfsr" => Self::lfsr(width),
            "stuck-at" => Self::stuck_at(width),
            "cycle" => Self::cycle(width),
            other => {
                return Err(TopologyError::UnknownInjectorKind {
                    segment: segment.to_string(),
                    kind: other.to_string(),
                })
            }
        };

        for (key, &value) in params {
            if key == "width" {
                continue;
            }
            let slot = kind.field_width_mut(key).ok_or_else(|| TopologyError::UnknownField {
                segment: segment.to_string(),
                kind: tag.to_string(),
                field: key.clone(),
            })?;
            *slot = value;
        }

        Ok(kind)
    }

    fn field_width_mut(&mut self, name: &str) -> Option<&mut u32> {
        match (self, name) {
            (InjectorKind::LfsrInjector { enable, .. }, "enable") => Some(enable),
            (InjectorKind::LfsrInjector { seed, .. }, "seed") => Some(seed),
            (InjectorKind::LfsrInjector { mask, .. }, "mask") => Some(mask),
            (InjectorKind::LfsrInjector { difficulty, .. }, "difficulty") => Some(difficulty),
            (InjectorKind::StuckAt { mask, .. }, "mask") => Some(mask),
            (InjectorKind::StuckAt { value, .. }, "value") => Some(value),
            (InjectorKind::CycleInjector { enable, .. }, "enable") => Some(enable),
            (InjectorKind::CycleInjector { cycle_count, .. }, "cycle_count") => {
                Some(cycle_count)
            }
            (InjectorKind::CycleInjector { inject_at, .. }, "inject_at") => Some(inject_at),
            _ => None,
        }
    }
}

impl fmt::Display for InjectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tag(), self.width())?;
        let fields = self.fields();
        if !fields.is_empty() {
            write!(f, " [")?;
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}:{}", field.name, field.width)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Segment layout
// ═══════════════════════════════════════════════════════════════════════

/// A sub-field placed within its segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: &'static str,
    pub width: u32,
    /// Bit index of the field's least significant bit, counted from the
    /// segment's least significant bit.
    pub offset: u32,
    pub binding: FieldBinding,
}

/// Bit layout of one chain segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLayout {
    pub name: String,
    pub position: usize,
    pub bit_width: u32,
    pub kind: InjectorKind,
    /// Fields, most significant first.
    pub fields: Vec<FieldLayout>,
    /// Zero bits below the last field.
    pub padding: u32,
}

impl SegmentLayout {
    /// Lay out `kind` within a `bit_width`-bit segment.
    ///
    /// Fields are packed from the top; any unused low bits are padding.
    pub fn new(
        name: &str,
        position: usize,
        bit_width: u32,
        kind: &InjectorKind,
    ) -> Result<Self, TopologyError> {
        if bit_width == 0 || kind.width() == 0 {
            return Err(TopologyError::ZeroWidth {
                segment: name.to_string(),
            });
        }

        let declared = kind.fields_width();
        if declared > bit_width as u64 {
            return Err(TopologyError::FieldsExceedWidth {
                segment: name.to_string(),
                kind: kind.tag(),
                fields_width: declared,
                bit_width,
            });
        }

        let mut cursor = bit_width;
        let fields = kind
            .fields()
            .into_iter()
            .map(|spec| {
                cursor -= spec.width;
                FieldLayout {
                    name: spec.name,
                    width: spec.width,
                    offset: cursor,
                    binding: spec.binding,
                }
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            position,
            bit_width,
            kind: kind.clone(),
            fields,
            padding: cursor,
        })
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn lfsr_defaults() {
        let kind = InjectorKind::lfsr(32);
        let names: Vec<_> = kind.fields().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["enable", "seed", "mask"]);
        assert_eq!(kind.fields_width(), 65);
    }

    #[test]
    fn lfsr_difficulty_is_optional() {
        let kind = InjectorKind::from_params(
            "r",
            "lfsr",
            &params(&[("width", 32), ("difficulty", 32)]),
        )
        .unwrap();
        let last = kind.fields().last().copied().unwrap();
        assert_eq!(last.name, "difficulty");
        assert_eq!(last.binding, FieldBinding::Difficulty);
        assert_eq!(kind.fields_width(), 97);
    }

    #[test]
    fn stuck_at_fields_bind_policy() {
        let fields = InjectorKind::stuck_at(32).fields();
        assert_eq!(fields[0].binding, FieldBinding::Mask);
        assert_eq!(fields[1].binding, FieldBinding::StuckAtValue);
        assert_eq!(fields[0].binding.parameter(), Some("mask"));
    }

    #[test]
    fn pass_through_has_unbound_data() {
        let fields = InjectorKind::pass_through(8).fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].binding, FieldBinding::None);
        assert_eq!(fields[0].binding.parameter(), None);
    }

    #[test]
    fn from_params_rejects_unknown_kind() {
        let err = InjectorKind::from_params("reg_x", "bogus", &params(&[("width", 8)]))
            .unwrap_err();
        assert_eq!(
            err,
            TopologyError::UnknownInjectorKind {
                segment: "reg_x".into(),
                kind: "bogus".into()
            }
        );
    }

    #[test]
    fn from_params_rejects_foreign_field() {
        let err = InjectorKind::from_params(
            "reg_x",
            "stuck-at",
            &params(&[("width", 8), ("seed", 4)]),
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::UnknownField { ref field, .. } if field == "seed"));
    }

    #[test]
    fn from_params_requires_width() {
        let err = InjectorKind::from_params("reg_x", "cycle", &params(&[])).unwrap_err();
        assert!(matches!(err, TopologyError::MissingWidth { .. }));
    }

    #[test]
    fn layout_offsets_top_down() {
        let layout = SegmentLayout::new("r", 0, 70, &InjectorKind::stuck_at(32)).unwrap();
        assert_eq!(layout.field("mask").unwrap().offset, 38);
        assert_eq!(layout.field("value").unwrap().offset, 6);
        assert_eq!(layout.padding, 6);
    }

    #[test]
    fn layout_rejects_overflow() {
        let err = SegmentLayout::new("r", 0, 32, &InjectorKind::stuck_at(32)).unwrap_err();
        assert_eq!(
            err,
            TopologyError::FieldsExceedWidth {
                segment: "r".into(),
                kind: "stuck-at",
                fields_width: 64,
                bit_width: 32,
            }
        );
    }

    #[test]
    fn layout_rejects_zero_width() {
        assert!(SegmentLayout::new("r", 0, 0, &InjectorKind::pass_through(1)).is_err());
        assert!(SegmentLayout::new("r", 0, 8, &InjectorKind::pass_through(0)).is_err());
    }

    #[test]
    fn display_lists_fields() {
        assert_eq!(
            InjectorKind::stuck_at(4).to_string(),
            "stuck-at(4) [mask:4, value:4]"
        );
    }
}
