//! Bitstream serialization: resolved fields → scan-chain words.
//!
//! A [`ChainLayout`] is built once per topology.  It holds every
//! segment's field offsets and the header word, which depends only on the
//! topology and so is computed here, once, rather than per policy.
//!
//! # Image layout
//!
//! ```text
//! word 0          header            topology-only
//! word 1          checksum          optional, MISR of the payload
//! word 1|2 ..     payload           segment 0 first, fields MSB first,
//!                                   first bit in bit 31, zero padded
//! ```

use crate::bits::BitString;
use crate::injectors::SegmentLayout;
use crate::policy::{FaultPolicy, PolicyError};
use crate::resolver::{self, ResolvedField, ResolvedSegment};
use crate::topology::{ChainTopology, TopologyError};
use crate::verified::bits::{pack_msb_first, words_for_bits, WORD_BITS};
use crate::verified::signature::misr_signature;
use bitvec::prelude::*;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from packing or unpacking an image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitstreamError {
    #[error("segment {segment:?}: expected {expected} resolved fields, got {actual}")]
    FieldCount {
        segment: String,
        expected: usize,
        actual: usize,
    },

    #[error("segment {segment:?} field {field:?}: expected {expected} bits, got {actual}")]
    FieldWidth {
        segment: String,
        field: String,
        expected: u32,
        actual: usize,
    },

    #[error("expected {expected} resolved segments, got {actual}")]
    SegmentCount { expected: usize, actual: usize },

    #[error("header mismatch: image has {found:#010x}, topology expects {expected:#010x}")]
    HeaderMismatch { expected: u32, found: u32 },

    #[error("image has {found} words, topology needs {expected}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("checksum mismatch: image has {found:#010x}, payload signs as {expected:#010x}")]
    ChecksumMismatch { expected: u32, found: u32 },

    #[error(
        "non-zero padding bits {}",
        .segment.as_ref().map_or_else(|| "after the last segment".to_string(), |s| format!("in segment {s:?}"))
    )]
    NonZeroPadding { segment: Option<String> },
}

// ═══════════════════════════════════════════════════════════════════════
//  Header derivation
// ═══════════════════════════════════════════════════════════════════════

/// Derives the header word from a topology.
///
/// Implementations must be pure functions of the topology.
pub trait HeaderDerivation: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    fn derive(&self, topology: &ChainTopology) -> u32;
}

/// First four bytes (big-endian) of SHA-256 over the ordered segment
/// names, widths, kinds and field widths.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologyFingerprint;

impl HeaderDerivation for TopologyFingerprint {
    fn name(&self) -> &'static str {
        "fingerprint"
    }

    fn derive(&self, topology: &ChainTopology) -> u32 {
        let mut hasher = Sha256::new();
        for segment in topology.segments() {
            hasher.update((segment.chain_position as u64).to_le_bytes());
            hasher.update((segment.name.len() as u64).to_le_bytes());
            hasher.update(segment.name.as_bytes());
            hasher.update(segment.bit_width.to_le_bytes());
            hasher.update(segment.kind.tag().as_bytes());
            hasher.update(segment.kind.width().to_le_bytes());
            for field in segment.kind.fields() {
                hasher.update(field.name.as_bytes());
                hasher.update(field.width.to_le_bytes());
            }
        }
        let digest = hasher.finalize();
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

/// Total scan bit count, the length word the le-chiffre `CYCLE`
/// controller reads.  Insensitive to segment order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainLength;

impl HeaderDerivation for ChainLength {
    fn name(&self) -> &'static str {
        "length"
    }

    fn derive(&self, topology: &ChainTopology) -> u32 {
        u32::try_from(topology.total_bits()).unwrap_or(u32::MAX)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Image
// ═══════════════════════════════════════════════════════════════════════

/// A serialized scan-chain image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanChainImage {
    pub header: u32,
    pub checksum: Option<u32>,
    pub payload: Vec<u32>,
    /// Meaningful payload bits before padding.
    pub payload_bits: u64,
}

impl ScanChainImage {
    /// All words in shift order.
    pub fn words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(self.word_count());
        words.push(self.header);
        words.extend(self.checksum);
        words.extend_from_slice(&self.payload);
        words
    }

    pub fn word_count(&self) -> usize {
        1 + self.checksum.is_some() as usize + self.payload.len()
    }

    /// Total image bits including header and padding.
    pub fn total_bits(&self) -> u64 {
        self.word_count() as u64 * WORD_BITS as u64
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Chain layout
// ═══════════════════════════════════════════════════════════════════════

/// Per-topology layout with its cached header word.
#[derive(Debug, Clone)]
pub struct ChainLayout {
    topology: ChainTopology,
    segments: Vec<SegmentLayout>,
    header: u32,
    header_name: &'static str,
}

impl ChainLayout {
    /// Lay out every segment and derive the header.
    pub fn new(
        topology: ChainTopology,
        header: &dyn HeaderDerivation,
    ) -> Result<Self, TopologyError> {
        let segments = topology
            .segments()
            .iter()
            .map(|s| s.layout())
            .collect::<Result<Vec<_>, _>>()?;
        let header_word = header.derive(&topology);
        Ok(Self {
            topology,
            segments,
            header: header_word,
            header_name: header.name(),
        })
    }

    pub fn topology(&self) -> &ChainTopology {
        &self.topology
    }

    pub fn segments(&self) -> &[SegmentLayout] {
        &self.segments
    }

    /// The topology-derived header word.
    pub fn header(&self) -> u32 {
        self.header
    }

    /// Name of the header derivation used.
    pub fn header_name(&self) -> &'static str {
        self.header_name
    }

    /// Sum of segment widths.
    pub fn payload_bits(&self) -> u64 {
        self.topology.total_bits()
    }

    pub fn payload_words(&self) -> usize {
        words_for_bits(self.payload_bits()) as usize
    }

    /// Resolve a policy against this layout.
    pub fn resolve(&self, policy: &FaultPolicy) -> Result<Vec<ResolvedSegment>, PolicyError> {
        resolver::resolve(&self.segments, policy)
    }

    /// Pack resolved segments into an image.
    pub fn serialize(
        &self,
        resolved: &[ResolvedSegment],
        checksum: bool,
    ) -> Result<ScanChainImage, BitstreamError> {
        if resolved.len() != self.segments.len() {
            return Err(BitstreamError::SegmentCount {
                expected: self.segments.len(),
                actual: resolved.len(),
            });
        }

        let mut stream = Vec::with_capacity(self.payload_bits() as usize);
        for (layout, segment) in self.segments.iter().zip(resolved) {
            if segment.fields.len() != layout.fields.len() {
                return Err(BitstreamError::FieldCount {
                    segment: layout.name.clone(),
                    expected: layout.fields.len(),
                    actual: segment.fields.len(),
                });
            }
            for (field, value) in layout.fields.iter().zip(&segment.fields) {
                if value.value.width() != field.width as usize || value.name != field.name {
                    return Err(BitstreamError::FieldWidth {
                        segment: layout.name.clone(),
                        field: field.name.to_string(),
                        expected: field.width,
                        actual: value.value.width(),
                    });
                }
                stream.extend(value.value.iter_msb_first());
            }
            stream.extend(std::iter::repeat(false).take(layout.padding as usize));
        }

        // Tiger Style: every segment contributed exactly its width
        debug_assert_eq!(stream.len() as u64, self.payload_bits());

        let payload = pack_msb_first(&stream);
        let checksum = checksum.then(|| misr_signature(&payload));
        Ok(ScanChainImage {
            header: self.header,
            checksum,
            payload,
            payload_bits: stream.len() as u64,
        })
    }

    /// Recover field values from an image.
    pub fn decode(&self, image: &ScanChainImage) -> Result<Vec<ResolvedSegment>, BitstreamError> {
        self.decode_words(&image.words(), image.checksum.is_some())
    }

    /// Recover field values from raw image words.
    ///
    /// Checks the header, the word count and, when `checksum` is set, the
    /// payload signature.  Padding bits, inside a segment or after the
    /// last one, must be zero.
    pub fn decode_words(
        &self,
        words: &[u32],
        checksum: bool,
    ) -> Result<Vec<ResolvedSegment>, BitstreamError> {
        let prefix = 1 + checksum as usize;
        let expected = prefix + self.payload_words();
        if words.len() != expected {
            return Err(BitstreamError::LengthMismatch {
                expected,
                found: words.len(),
            });
        }
        if words[0] != self.header {
            return Err(BitstreamError::HeaderMismatch {
                expected: self.header,
                found: words[0],
            });
        }

        let payload = &words[prefix..];
        if checksum {
            let expected = misr_signature(payload);
            if words[1] != expected {
                return Err(BitstreamError::ChecksumMismatch {
                    expected,
                    found: words[1],
                });
            }
        }

        let bits = payload.view_bits::<Msb0>();
        let mut cursor = 0usize;
        let mut resolved = Vec::with_capacity(self.segments.len());
        for layout in &self.segments {
            let mut fields = Vec::with_capacity(layout.fields.len());
            for field in &layout.fields {
                let end = cursor + field.width as usize;
                fields.push(ResolvedField {
                    name: field.name,
                    value: BitString::from_msb_first(bits[cursor..end].iter().map(|b| *b)),
                });
                cursor = end;
            }

            let end = cursor + layout.padding as usize;
            if bits[cursor..end].any() {
                return Err(BitstreamError::NonZeroPadding {
                    segment: Some(layout.name.clone()),
                });
            }
            cursor = end;

            resolved.push(ResolvedSegment {
                name: layout.name.clone(),
                position: layout.position,
                fields,
            });
        }

        if bits[cursor..].any() {
            return Err(BitstreamError::NonZeroPadding { segment: None });
        }

        Ok(resolved)
    }
}
