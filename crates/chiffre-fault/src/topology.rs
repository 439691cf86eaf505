//! Chain topology model and descriptor loading.
//!
//! A [`ChainTopology`] is the ordered, immutable list of register
//! segments in one scan chain.  Positions must run `0..n` with no gaps
//! or repeats; the vector is stored sorted so index == chain position.
//!
//! Topologies come from a JSON descriptor produced by the hardware
//! generator, mapping chain names to segment lists:
//!
//! ```json
//! {
//!   "main": [
//!     { "name": "reg_fflags", "position": 0,
//!       "injector": { "kind": "lfsr", "width": 32, "difficulty": 32 } },
//!     { "name": "reg_frm", "position": 1, "width": 100,
//!       "injector": { "kind": "cycle", "width": 32 } }
//!   ]
//! }
//! ```

use crate::injectors::{InjectorKind, SegmentLayout};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Structural errors in a chain topology.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("chain {chain:?} has no segments")]
    EmptyChain { chain: String },

    #[error("chain {chain:?} not found in descriptor")]
    UnknownChain { chain: String },

    #[error("segments {first:?} and {second:?} both claim chain position {position}")]
    DuplicatePosition {
        position: usize,
        first: String,
        second: String,
    },

    #[error("chain positions not contiguous: segment {segment:?} at position {found}, expected {expected}")]
    PositionGap {
        segment: String,
        expected: usize,
        found: usize,
    },

    #[error("segment name {segment:?} appears more than once")]
    DuplicateName { segment: String },

    #[error("segment {segment:?} has zero width")]
    ZeroWidth { segment: String },

    #[error("segment {segment:?}: injector width not given")]
    MissingWidth { segment: String },

    #[error(
        "segment {segment:?}: {kind} fields need {fields_width} bits but the segment is {bit_width} bits wide"
    )]
    FieldsExceedWidth {
        segment: String,
        kind: &'static str,
        fields_width: u64,
        bit_width: u32,
    },

    #[error(
        "segment {segment:?}: unknown injector kind {kind:?} (expected one of {})",
        InjectorKind::TAGS.join(", ")
    )]
    UnknownInjectorKind { segment: String, kind: String },

    #[error("segment {segment:?}: {kind} injector has no field {field:?}")]
    UnknownField {
        segment: String,
        kind: String,
        field: String,
    },
}

/// Errors from reading a descriptor file.
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ═══════════════════════════════════════════════════════════════════════
//  Model
// ═══════════════════════════════════════════════════════════════════════

/// One register segment in a scan chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSegment {
    pub name: String,
    /// Scan bits occupied by the segment.
    pub bit_width: u32,
    pub kind: InjectorKind,
    /// Shift order, from 0.
    pub chain_position: usize,
}

impl ChainSegment {
    /// A segment exactly as wide as its injector's fields.
    pub fn new(name: impl Into<String>, chain_position: usize, kind: InjectorKind) -> Self {
        let bit_width = u32::try_from(kind.fields_width()).unwrap_or(u32::MAX);
        Self {
            name: name.into(),
            bit_width,
            kind,
            chain_position,
        }
    }

    /// Override the scan width (extra bits become low-order padding).
    pub fn with_bit_width(mut self, bit_width: u32) -> Self {
        self.bit_width = bit_width;
        self
    }

    /// Bit layout of this segment.
    pub fn layout(&self) -> Result<SegmentLayout, TopologyError> {
        SegmentLayout::new(&self.name, self.chain_position, self.bit_width, &self.kind)
    }
}

/// A validated scan chain, segments sorted by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTopology {
    name: String,
    segments: Vec<ChainSegment>,
}

impl ChainTopology {
    /// Validate and order `segments`.
    ///
    /// Rejects empty chains, duplicate or non-contiguous positions,
    /// duplicate names, and segments whose fields overflow their width.
    pub fn new(
        name: impl Into<String>,
        mut segments: Vec<ChainSegment>,
    ) -> Result<Self, TopologyError> {
        let name = name.into();
        if segments.is_empty() {
            return Err(TopologyError::EmptyChain { chain: name });
        }

        segments.sort_by_key(|s| s.chain_position);

        for (expected, segment) in segments.iter().enumerate() {
            if segment.chain_position != expected {
                if expected > 0 && segments[expected - 1].chain_position == segment.chain_position {
                    return Err(TopologyError::DuplicatePosition {
                        position: segment.chain_position,
                        first: segments[expected - 1].name.clone(),
                        second: segment.name.clone(),
                    });
                }
                return Err(TopologyError::PositionGap {
                    segment: segment.name.clone(),
                    expected,
                    found: segment.chain_position,
                });
            }
        }

        let mut seen = HashSet::new();
        for segment in &segments {
            if !seen.insert(segment.name.as_str()) {
                return Err(TopologyError::DuplicateName {
                    segment: segment.name.clone(),
                });
            }
            segment.layout()?;
        }

        Ok(Self { name, segments })
    }

    /// Chain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segments in shift order.
    pub fn segments(&self) -> &[ChainSegment] {
        &self.segments
    }

    /// Segment at a chain position.
    pub fn segment(&self, position: usize) -> Option<&ChainSegment> {
        self.segments.get(position)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of all segment widths.
    pub fn total_bits(&self) -> u64 {
        self.segments.iter().map(|s| s.bit_width as u64).sum()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Descriptor
// ═══════════════════════════════════════════════════════════════════════

/// Injector entry in a descriptor: a kind tag plus width parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectorDescriptor {
    pub kind: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, u32>,
}

/// Segment entry in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub name: String,
    pub position: usize,
    /// Scan width; defaults to the injector's field widths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    pub injector: InjectorDescriptor,
}

impl SegmentDescriptor {
    /// Convert to a model segment.
    pub fn to_segment(&self) -> Result<ChainSegment, TopologyError> {
        let kind = InjectorKind::from_params(&self.name, &self.injector.kind, &self.injector.params)?;
        let segment = ChainSegment::new(self.name.clone(), self.position, kind);
        Ok(match self.width {
            Some(width) => segment.with_bit_width(width),
            None => segment,
        })
    }
}

/// A topology descriptor: chain name → segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainDescriptor {
    pub chains: BTreeMap<String, Vec<SegmentDescriptor>>,
}

impl ChainDescriptor {
    /// Parse descriptor JSON.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Load a descriptor file.
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let file = File::open(path)?;
        let descriptor = serde_json::from_reader(file)?;
        Ok(descriptor)
    }

    /// Chain names in sorted order.
    pub fn chain_names(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    /// Build and validate one named chain.
    pub fn topology(&self, chain: &str) -> Result<ChainTopology, TopologyError> {
        let entries = self
            .chains
            .get(chain)
            .ok_or_else(|| TopologyError::UnknownChain {
                chain: chain.to_string(),
            })?;
        let segments = entries
            .iter()
            .map(SegmentDescriptor::to_segment)
            .collect::<Result<Vec<_>, _>>()?;
        ChainTopology::new(chain, segments)
    }

    /// Build and validate every chain.
    pub fn topologies(&self) -> Result<Vec<ChainTopology>, TopologyError> {
        self.chain_names().map(|name| self.topology(name)).collect()
    }
}
