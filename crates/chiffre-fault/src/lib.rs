//! Scan-chain image compiler for le-chiffre fault injection.
//!
//! Takes a description of a scan chain (which injectors sit where, and how
//! wide their configuration registers are) plus a fault policy, and
//! produces the bit image that is shifted into the chain to program every
//! injector.
//!
//! # Architecture
//!
//! ```text
//! descriptor ──→ ChainTopology ──→ ChainLayout ──────────────┐ header
//!                                      │                     │
//! FaultPolicy ──→ resolver ←───────────┘                     │
//!                    │  (one ChaCha20 mask stream)           │
//!                    ▼                                       ▼
//!            Vec<ResolvedSegment> ──→ bitstream ──→ ScanChainImage ──→ image
//! ```
//!
//! 1. **[`topology`]**: chain segments, shift order, JSON descriptors
//! 2. **[`injectors`]**: the closed set of injector kinds and their fields
//! 3. **[`policy`]** / **[`resolver`]**: policy parameters → field values
//! 4. **[`bitstream`]**: field values → 32-bit words, and back
//! 5. **[`image`]**: binary and assembly output
//! 6. **[`compiler`]**: ties the above together, with optional
//!    compile-twice verification ([`verify`])

pub mod bits;
pub mod bitstream;
pub mod compiler;
pub mod image;
pub mod injectors;
pub mod mask;
pub mod policy;
pub mod resolver;
pub mod topology;
pub mod verified;
pub mod verify;
