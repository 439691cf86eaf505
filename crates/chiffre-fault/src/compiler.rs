//! Scan-chain compiler: the central orchestrator.
//!
//! [`ScanChainCompiler`] turns a topology and a fault policy into a
//! [`ScanChainImage`].  Layouts (and their header words) are built once per
//! topology; each compilation owns its own fault-mask stream, so the
//! compiler can be shared freely.

use crate::bitstream::{
    BitstreamError, ChainLayout, ChainLength, HeaderDerivation, ScanChainImage,
    TopologyFingerprint,
};
use crate::policy::{FaultPolicy, PolicyError};
use crate::resolver::ResolvedSegment;
use crate::topology::{ChainDescriptor, ChainTopology, TopologyError};
use crate::verify::{ImageVerifier, WordDivergence};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from compiling a chain.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Bitstream(#[from] BitstreamError),

    #[error("chain {chain:?} compiled to different images from the same inputs\n{divergence}")]
    Nondeterministic {
        chain: String,
        divergence: Box<WordDivergence>,
    },
}

/// How the header word is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderKind {
    /// [`TopologyFingerprint`].
    #[default]
    Fingerprint,
    /// [`ChainLength`].
    Length,
}

impl HeaderKind {
    pub fn derivation(&self) -> &'static dyn HeaderDerivation {
        match self {
            HeaderKind::Fingerprint => &TopologyFingerprint,
            HeaderKind::Length => &ChainLength,
        }
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.derivation().name())
    }
}

/// Configuration for the compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Header derivation for every layout.
    pub header: HeaderKind,
    /// Insert a MISR checksum word after the header.
    pub checksum: bool,
    /// Compile every chain twice and reject differing images.
    pub verify: bool,
}

/// One compiled chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledChain {
    pub chain: String,
    pub resolved: Vec<ResolvedSegment>,
    pub image: ScanChainImage,
}

impl CompiledChain {
    /// A serializable summary for reports.
    pub fn report(&self) -> ChainReport {
        ChainReport {
            chain: self.chain.clone(),
            header: format!("{:#010x}", self.image.header),
            checksum: self.image.checksum.map(|c| format!("{:#010x}", c)),
            words: self.image.word_count(),
            payload_bits: self.image.payload_bits,
            segments: self
                .resolved
                .iter()
                .map(|s| SegmentReport {
                    name: s.name.clone(),
                    position: s.position,
                    fields: s
                        .fields
                        .iter()
                        .map(|f| (f.name.to_string(), f.value.to_string()))
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Summary of a compiled chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub chain: String,
    pub header: String,
    pub checksum: Option<String>,
    pub words: usize,
    pub payload_bits: u64,
    pub segments: Vec<SegmentReport>,
}

/// Resolved field values of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub name: String,
    pub position: usize,
    /// `(field, value)` pairs, most significant first.
    pub fields: Vec<(String, String)>,
}

/// The scan-chain compiler.
///
/// # Example
///
/// ```
/// use chiffre_fault::bits::BitString;
/// use chiffre_fault::compiler::{CompilerConfig, ScanChainCompiler};
/// use chiffre_fault::injectors::InjectorKind;
/// use chiffre_fault::policy::FaultPolicyBuilder;
/// use chiffre_fault::topology::{ChainSegment, ChainTopology};
///
/// let topology = ChainTopology::new(
///     "main",
///     vec![ChainSegment::new("reg_a", 0, InjectorKind::stuck_at(32))],
/// )
/// .unwrap();
///
/// let policy = FaultPolicyBuilder::new()
///     .mask(BitString::from_hex("00000000ffffffff").unwrap())
///     .stuck_at(BitString::from_hex("00000000deadbeef").unwrap())
///     .build()
///     .unwrap();
///
/// let compiler = ScanChainCompiler::new(CompilerConfig::default());
/// let layout = compiler.layout(topology).unwrap();
/// let compiled = compiler.compile(&layout, &policy).unwrap();
///
/// assert_eq!(compiled.image.payload, vec![0xffffffff, 0xdeadbeef]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScanChainCompiler {
    config: CompilerConfig,
}

impl ScanChainCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Lay out a topology with the configured header derivation.
    pub fn layout(&self, topology: ChainTopology) -> Result<ChainLayout, TopologyError> {
        let layout = ChainLayout::new(topology, self.config.header.derivation())?;
        debug!(
            "laid out chain {}: {} segments, {} header {:#010x}",
            layout.topology().name(),
            layout.segments().len(),
            layout.header_name(),
            layout.header()
        );
        Ok(layout)
    }

    /// Compile one policy against one layout.
    pub fn compile(
        &self,
        layout: &ChainLayout,
        policy: &FaultPolicy,
    ) -> Result<CompiledChain, CompileError> {
        let chain = layout.topology().name().to_string();
        let (resolved, image) = self.compile_once(layout, policy)?;

        if self.config.verify {
            let (_, again) = self.compile_once(layout, policy)?;
            let result = ImageVerifier::compare_with_layout(
                layout,
                &image.words(),
                &again.words(),
                self.config.checksum,
            );
            if let Some(divergence) = result.first_divergence {
                return Err(CompileError::Nondeterministic {
                    chain,
                    divergence: Box::new(divergence),
                });
            }
            debug!("chain {}: second compilation identical", chain);
        }

        info!(
            "compiled chain {}: {} segments, {} bits, {} words, header {:#010x}",
            chain,
            resolved.len(),
            image.payload_bits,
            image.word_count(),
            image.header
        );

        Ok(CompiledChain {
            chain,
            resolved,
            image,
        })
    }

    /// Compile `chain` from a descriptor, or every chain in name order
    /// when `chain` is `None`.
    ///
    /// Fails on the first error; nothing is returned for other chains.
    pub fn compile_descriptor(
        &self,
        descriptor: &ChainDescriptor,
        chain: Option<&str>,
        policy: &FaultPolicy,
    ) -> Result<Vec<CompiledChain>, CompileError> {
        let topologies = match chain {
            Some(name) => vec![descriptor.topology(name)?],
            None => descriptor.topologies()?,
        };
        topologies
            .into_iter()
            .map(|topology| {
                let layout = self.layout(topology)?;
                self.compile(&layout, policy)
            })
            .collect()
    }

    fn compile_once(
        &self,
        layout: &ChainLayout,
        policy: &FaultPolicy,
    ) -> Result<(Vec<ResolvedSegment>, ScanChainImage), CompileError> {
        let resolved = layout.resolve(policy)?;
        let image = layout.serialize(&resolved, self.config.checksum)?;
        Ok((resolved, image))
    }
}
