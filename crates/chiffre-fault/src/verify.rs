//! Image comparison.
//!
//! Compiling the same topology with the same policy must give the same
//! words.  [`ImageVerifier`] compares two images word by word and, given
//! the chain layout, names the segments a diverging word covers.

use crate::bitstream::ChainLayout;
use crate::verified::bits::WORD_BITS;
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
//  Divergence
// ═══════════════════════════════════════════════════════════════════════

/// Which part of the image a word belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordRegion {
    Header,
    Checksum,
    Payload,
}

/// The first word where two images differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDivergence {
    pub word_index: usize,
    pub region: WordRegion,
    /// `None` when image A ended first.
    pub word_a: Option<u32>,
    /// `None` when image B ended first.
    pub word_b: Option<u32>,
    /// Segments with at least one bit in the diverging word.
    pub segments: Vec<String>,
}

impl fmt::Display for WordDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DIVERGENCE at word {} ({:?}):", self.word_index, self.region)?;
        match self.word_a {
            Some(w) => writeln!(f, "  Image A: {:#010x}", w)?,
            None => writeln!(f, "  Image A: <ended>")?,
        }
        match self.word_b {
            Some(w) => writeln!(f, "  Image B: {:#010x}", w)?,
            None => writeln!(f, "  Image B: <ended>")?,
        }
        if !self.segments.is_empty() {
            writeln!(f, "  Segments: {}", self.segments.join(", "))?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Comparison result
// ═══════════════════════════════════════════════════════════════════════

/// Result of comparing two images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageComparison {
    pub is_identical: bool,
    pub image_a_len: usize,
    pub image_b_len: usize,
    /// Words that matched before the first divergence.
    pub matching_words: usize,
    pub first_divergence: Option<WordDivergence>,
}

impl fmt::Display for ImageComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identical {
            writeln!(f, "✅ IDENTICAL: {} words matched", self.matching_words)?;
        } else {
            writeln!(f, "❌ DIFFERENT")?;
            writeln!(
                f,
                "   Image A: {} words, Image B: {} words",
                self.image_a_len, self.image_b_len
            )?;
            writeln!(f, "   Matched {} words before divergence", self.matching_words)?;
        }
        if let Some(ref div) = self.first_divergence {
            writeln!(f)?;
            write!(f, "{}", div)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Verifier
// ═══════════════════════════════════════════════════════════════════════

/// Compares scan-chain images.
pub struct ImageVerifier;

impl ImageVerifier {
    /// Compare two word sequences without layout information.
    ///
    /// Word 0 is the header; every other word is reported as payload.
    pub fn compare(a: &[u32], b: &[u32]) -> ImageComparison {
        Self::compare_inner(a, b, |index| (region_of(index, false), Vec::new()))
    }

    /// Compare two images compiled from `layout`, naming the segments a
    /// diverging payload word covers.
    pub fn compare_with_layout(
        layout: &ChainLayout,
        a: &[u32],
        b: &[u32],
        checksum: bool,
    ) -> ImageComparison {
        Self::compare_inner(a, b, |index| {
            let region = region_of(index, checksum);
            let segments = match region {
                WordRegion::Payload => {
                    let prefix = 1 + checksum as usize;
                    segments_in_word(layout, index - prefix)
                }
                _ => Vec::new(),
            };
            (region, segments)
        })
    }

    /// Every differing word, in index order.  Words past the end of the
    /// shorter image diverge against `None`.
    pub fn divergences(a: &[u32], b: &[u32]) -> Vec<WordDivergence> {
        (0..a.len().max(b.len()))
            .filter(|&i| a.get(i) != b.get(i))
            .map(|i| WordDivergence {
                word_index: i,
                region: region_of(i, false),
                word_a: a.get(i).copied(),
                word_b: b.get(i).copied(),
                segments: Vec::new(),
            })
            .collect()
    }

    fn compare_inner(
        a: &[u32],
        b: &[u32],
        locate: impl Fn(usize) -> (WordRegion, Vec<String>),
    ) -> ImageComparison {
        let min_len = a.len().min(b.len());
        let matching = a.iter().zip(b).take_while(|(x, y)| x == y).count();

        let first_divergence = if matching < min_len || a.len() != b.len() {
            let (region, segments) = locate(matching);
            Some(WordDivergence {
                word_index: matching,
                region,
                word_a: a.get(matching).copied(),
                word_b: b.get(matching).copied(),
                segments,
            })
        } else {
            None
        };

        ImageComparison {
            is_identical: first_divergence.is_none(),
            image_a_len: a.len(),
            image_b_len: b.len(),
            matching_words: matching,
            first_divergence,
        }
    }
}

fn region_of(index: usize, checksum: bool) -> WordRegion {
    match (index, checksum) {
        (0, _) => WordRegion::Header,
        (1, true) => WordRegion::Checksum,
        _ => WordRegion::Payload,
    }
}

/// Names of segments overlapping payload word `word`.
fn segments_in_word(layout: &ChainLayout, word: usize) -> Vec<String> {
    let lo = word as u64 * WORD_BITS as u64;
    let hi = lo + WORD_BITS as u64;
    let mut offset = 0u64;
    let mut names = Vec::new();
    for segment in layout.segments() {
        let end = offset + segment.bit_width as u64;
        if offset < hi && end > lo {
            names.push(segment.name.clone());
        }
        offset = end;
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitString;
    use crate::bitstream::{ScanChainImage, TopologyFingerprint};
    use crate::policy::FaultPolicy;
    use crate::resolver::ResolvedSegment;
    use crate::injectors::InjectorKind;
    use crate::policy::FaultPolicyBuilder;
    use crate::topology::{ChainSegment, ChainTopology};

    fn layout() -> ChainLayout {
        let topology = ChainTopology::new(
            "main",
            vec![
                ChainSegment::new("stuck", 0, InjectorKind::stuck_at(16)),
                ChainSegment::new("lfsr", 1, InjectorKind::lfsr(16)),
                ChainSegment::new("data", 2, InjectorKind::pass_through(16)),
            ],
        )
        .unwrap();
        ChainLayout::new(topology, &TopologyFingerprint).unwrap()
    }

    fn compile(
        layout: &ChainLayout,
        policy: &FaultPolicy,
        checksum: bool,
    ) -> (Vec<ResolvedSegment>, ScanChainImage) {
        let resolved = layout.resolve(policy).unwrap();
        let image = layout.serialize(&resolved, checksum).unwrap();
        (resolved, image)
    }

    #[test]
    fn identical_images() {
        let result = ImageVerifier::compare(&[1, 2, 3], &[1, 2, 3]);
        assert!(result.is_identical);
        assert_eq!(result.matching_words, 3);
        assert!(result.first_divergence.is_none());
        assert!(result.to_string().contains("IDENTICAL"));
    }

    #[test]
    fn header_divergence() {
        let result = ImageVerifier::compare(&[1, 2], &[9, 2]);
        let div = result.first_divergence.unwrap();
        assert_eq!(div.word_index, 0);
        assert_eq!(div.region, WordRegion::Header);
        assert_eq!(div.word_a, Some(1));
        assert_eq!(div.word_b, Some(9));
    }

    #[test]
    fn length_divergence() {
        let result = ImageVerifier::compare(&[1, 2, 3], &[1, 2]);
        assert!(!result.is_identical);
        let div = result.first_divergence.unwrap();
        assert_eq!(div.word_index, 2);
        assert_eq!(div.word_a, Some(3));
        assert_eq!(div.word_b, None);
    }

    #[test]
    fn all_divergences_listed() {
        let divs = ImageVerifier::divergences(&[1, 2, 3, 4], &[1, 5, 3]);
        assert_eq!(divs.len(), 2);
        assert_eq!(divs[0].word_index, 1);
        assert_eq!((divs[0].word_a, divs[0].word_b), (Some(2), Some(5)));
        assert_eq!(divs[1].word_index, 3);
        assert_eq!(divs[1].word_b, None);
        assert!(ImageVerifier::divergences(&[7], &[7]).is_empty());
    }

    #[test]
    fn seed_change_names_lfsr_segment() {
        let layout = layout();
        let base = FaultPolicyBuilder::new()
            .mask(BitString::from_hex("ff").unwrap())
            .probability(0.5);
        let (_, a) = compile(&layout, &base.clone().seed(1).build().unwrap(), true);
        let (_, b) = compile(&layout, &base.clone().seed(2).build().unwrap(), true);

        let result = ImageVerifier::compare_with_layout(&layout, &a.words(), &b.words(), true);
        assert_eq!(result.first_divergence.unwrap().region, WordRegion::Checksum);

        let (_, a) = compile(&layout, &base.clone().seed(1).build().unwrap(), false);
        let (_, b) = compile(&layout, &base.seed(2).build().unwrap(), false);
        let result = ImageVerifier::compare_with_layout(&layout, &a.words(), &b.words(), false);
        let div = result.first_divergence.unwrap();
        // header, then the stuck-at word, then the first lfsr word
        assert_eq!(div.word_index, 2);
        assert_eq!(div.region, WordRegion::Payload);
        assert_eq!(div.segments, vec!["lfsr"]);
    }

    #[test]
    fn segments_in_word_spans() {
        let layout = layout();
        // stuck: bits 0..32, lfsr: 32..81, data: 81..97
        assert_eq!(segments_in_word(&layout, 0), vec!["stuck"]);
        assert_eq!(segments_in_word(&layout, 1), vec!["lfsr"]);
        assert_eq!(segments_in_word(&layout, 2), vec!["lfsr", "data"]);
        assert_eq!(segments_in_word(&layout, 3), vec!["data"]);
    }
}
