//! Runtime control protocol for the le-chiffre fault-injection coprocessor.
//!
//! Test programs drive an already-configured scan chain through RoCC
//! custom instructions.  This crate defines the opcode space, function
//! selectors, and the bit-exact instruction encoding so host tools can
//! emit the same words the assembly macros produce.  It is
//! `no_std`-compatible with zero dependencies.
//!
//! # Instruction format
//!
//! ```text
//!  31      25 24   20 19   15 14  13  12 11    7 6      0
//! ┌──────────┬───────┬───────┬───┬───┬───┬───────┬────────┐
//! │  funct7  │  rs2  │  rs1  │xd │xs1│xs2│  rd   │ opcode │
//! └──────────┴───────┴───────┴───┴───┴───┴───────┴────────┘
//! ```
//!
//! The le-chiffre macros always use the raw R-R-R form, which sets all
//! three `x*` bits regardless of whether the operation reads `rs1`.
//!
//! # Operations
//!
//! 1. `ECHO` returns `rs1` through the coprocessor (self-test)
//! 2. `CYCLE` shifts the image at address `rs1` into the chain
//! 3. `ENABLE` arms fault injection
//! 4. `CHECK` returns the chain checksum in `rd`
//! 5. `WRITE_*` program seed, difficulty, or duration from memory at `rs1`

#![cfg_attr(not(feature = "std"), no_std)]

// ═══════════════════════════════════════════════════════════════════════
//  Opcodes
// ═══════════════════════════════════════════════════════════════════════

/// Major opcode `custom-0`.
pub const CUSTOM_0: u8 = 0b000_1011;

/// Major opcode `custom-1`.
pub const CUSTOM_1: u8 = 0b010_1011;

/// Major opcode `custom-2`.
pub const CUSTOM_2: u8 = 0b101_1011;

/// Major opcode `custom-3`.
pub const CUSTOM_3: u8 = 0b111_1011;

/// Custom opcode slot the le-chiffre accelerator is attached to.
pub const DEFAULT_CUSTOM: u8 = 2;

/// Register conventionally used to carry the payload (`a0`).
pub const PAYLOAD_REG: u8 = 10;

// ═══════════════════════════════════════════════════════════════════════
//  Function selectors (funct7)
// ═══════════════════════════════════════════════════════════════════════

/// Round-trip `rs1` through the coprocessor.
pub const F_ECHO: u8 = 0;

/// Shift the image at address `rs1` into the scan chain.
pub const F_CYCLE: u8 = 1;

/// Arm fault injection.
pub const F_ENABLE: u8 = 2;

/// Read back the checksum of the chain state.
pub const F_CHECK: u8 = 3;

/// Program the injector seed from memory at `rs1`.
pub const F_WRITE_SEED: u8 = 4;

/// Program the injector difficulty from memory at `rs1`.
pub const F_WRITE_DIFFICULTY: u8 = 5;

/// Program the injection duration from memory at `rs1`.
pub const F_WRITE_DURATION: u8 = 6;

// ═══════════════════════════════════════════════════════════════════════
//  Operations
// ═══════════════════════════════════════════════════════════════════════

/// How an operation interprets its `rs1` operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// `rs1` is ignored.
    None,
    /// `rs1` holds the payload value itself.
    Data,
    /// `rs1` holds the address of the payload in memory.
    Address,
}

/// A le-chiffre coprocessor operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeChiffreOp {
    Echo,
    Cycle,
    Enable,
    Check,
    WriteSeed,
    WriteDifficulty,
    WriteDuration,
}

impl LeChiffreOp {
    /// All operations in selector order.
    pub const ALL: [LeChiffreOp; 7] = [
        LeChiffreOp::Echo,
        LeChiffreOp::Cycle,
        LeChiffreOp::Enable,
        LeChiffreOp::Check,
        LeChiffreOp::WriteSeed,
        LeChiffreOp::WriteDifficulty,
        LeChiffreOp::WriteDuration,
    ];

    /// The `funct7` selector for this operation.
    pub const fn funct(self) -> u8 {
        match self {
            LeChiffreOp::Echo => F_ECHO,
            LeChiffreOp::Cycle => F_CYCLE,
            LeChiffreOp::Enable => F_ENABLE,
            LeChiffreOp::Check => F_CHECK,
            LeChiffreOp::WriteSeed => F_WRITE_SEED,
            LeChiffreOp::WriteDifficulty => F_WRITE_DIFFICULTY,
            LeChiffreOp::WriteDuration => F_WRITE_DURATION,
        }
    }

    /// Look up an operation by its `funct7` selector.
    pub const fn from_funct(funct: u8) -> Option<Self> {
        match funct {
            F_ECHO => Some(LeChiffreOp::Echo),
            F_CYCLE => Some(LeChiffreOp::Cycle),
            F_ENABLE => Some(LeChiffreOp::Enable),
            F_CHECK => Some(LeChiffreOp::Check),
            F_WRITE_SEED => Some(LeChiffreOp::WriteSeed),
            F_WRITE_DIFFICULTY => Some(LeChiffreOp::WriteDifficulty),
            F_WRITE_DURATION => Some(LeChiffreOp::WriteDuration),
            _ => None,
        }
    }

    /// How the operation uses `rs1`.
    pub const fn operand(self) -> Operand {
        match self {
            LeChiffreOp::Echo => Operand::Data,
            LeChiffreOp::Enable | LeChiffreOp::Check => Operand::None,
            LeChiffreOp::Cycle
            | LeChiffreOp::WriteSeed
            | LeChiffreOp::WriteDifficulty
            | LeChiffreOp::WriteDuration => Operand::Address,
        }
    }

    /// The `rs1` the assembly macros pass: [`PAYLOAD_REG`] when the
    /// operand is read, x0 otherwise.
    pub const fn default_rs1(self) -> u8 {
        match self.operand() {
            Operand::None => 0,
            Operand::Data | Operand::Address => PAYLOAD_REG,
        }
    }

    /// Upper-case mnemonic as used in the assembly macros.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            LeChiffreOp::Echo => "ECHO",
            LeChiffreOp::Cycle => "CYCLE",
            LeChiffreOp::Enable => "ENABLE",
            LeChiffreOp::Check => "CHECK",
            LeChiffreOp::WriteSeed => "WRITE_SEED",
            LeChiffreOp::WriteDifficulty => "WRITE_DIFFICULTY",
            LeChiffreOp::WriteDuration => "WRITE_DURATION",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Instruction encoding
// ═══════════════════════════════════════════════════════════════════════

/// Major opcode for custom slot `x` (0..=3).
pub const fn custom_opcode(x: u8) -> Option<u8> {
    match x {
        0 => Some(CUSTOM_0),
        1 => Some(CUSTOM_1),
        2 => Some(CUSTOM_2),
        3 => Some(CUSTOM_3),
        _ => None,
    }
}

/// A decoded RoCC instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoccInstruction {
    /// Custom slot (0..=3).
    pub custom: u8,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    /// Core waits for a result in `rd`.
    pub xd: bool,
    /// Core sends `rs1`.
    pub xs1: bool,
    /// Core sends `rs2`.
    pub xs2: bool,
    pub funct7: u8,
}

impl RoccInstruction {
    /// Raw R-R-R form: `xd`, `xs1` and `xs2` all set.
    pub const fn raw_r_r_r(custom: u8, rd: u8, rs1: u8, rs2: u8, funct7: u8) -> Self {
        Self {
            custom,
            rd,
            rs1,
            rs2,
            xd: true,
            xs1: true,
            xs2: true,
            funct7,
        }
    }

    /// Encode into a 32-bit instruction word.
    ///
    /// Returns `None` if any field does not fit its slot.
    pub const fn encode(&self) -> Option<u32> {
        let opcode = match custom_opcode(self.custom) {
            Some(op) => op,
            None => return None,
        };
        if self.rd > 31 || self.rs1 > 31 || self.rs2 > 31 || self.funct7 > 0x7f {
            return None;
        }
        Some(
            (opcode as u32)
                | (self.rd as u32) << 7
                | (self.xs2 as u32) << 12
                | (self.xs1 as u32) << 13
                | (self.xd as u32) << 14
                | (self.rs1 as u32) << 15
                | (self.rs2 as u32) << 20
                | (self.funct7 as u32) << 25,
        )
    }

    /// Decode an instruction word.  Returns `None` for non-custom opcodes.
    pub const fn decode(word: u32) -> Option<Self> {
        let custom = match (word & 0x7f) as u8 {
            CUSTOM_0 => 0,
            CUSTOM_1 => 1,
            CUSTOM_2 => 2,
            CUSTOM_3 => 3,
            _ => return None,
        };
        Some(Self {
            custom,
            rd: ((word >> 7) & 0x1f) as u8,
            xs2: (word >> 12) & 1 != 0,
            xs1: (word >> 13) & 1 != 0,
            xd: (word >> 14) & 1 != 0,
            rs1: ((word >> 15) & 0x1f) as u8,
            rs2: ((word >> 20) & 0x1f) as u8,
            funct7: ((word >> 25) & 0x7f) as u8,
        })
    }

    /// The le-chiffre operation this instruction selects, if any.
    pub const fn op(&self) -> Option<LeChiffreOp> {
        LeChiffreOp::from_funct(self.funct7)
    }
}

/// Encode a le-chiffre operation the way the assembly macros do.
///
/// Operations that ignore `rs1` encode register 0 regardless of the
/// argument.  Returns `None` for an invalid slot or register.
pub const fn le_chiffre(op: LeChiffreOp, custom: u8, rd: u8, rs1: u8) -> Option<u32> {
    let rs1 = match op.operand() {
        Operand::None => 0,
        Operand::Data | Operand::Address => rs1,
    };
    RoccInstruction::raw_r_r_r(custom, rd, rs1, 0, op.funct()).encode()
}

// ═══════════════════════════════════════════════════════════════════════
//  CYCLE self-test pattern
// ═══════════════════════════════════════════════════════════════════════

/// Build a `CYCLE` image that shifts `ones` set bits followed by
/// `size - ones` clear bits.
///
/// # Layout
///
/// ```text
/// word 0      size (bit count)
/// word 1..    pattern, first bit in bit 31 of word 1, zero padded
/// ```
///
/// Returns the number of words written, or `None` if `ones > size` or
/// `buf` is too small.
pub fn cycle_pattern(ones: u32, size: u32, buf: &mut [u32]) -> Option<usize> {
    if ones > size {
        return None;
    }
    let data_words = size.div_ceil(32) as usize;
    let total = 1 + data_words;
    if buf.len() < total {
        return None;
    }

    buf[0] = size;
    for (i, word) in buf[1..total].iter_mut().enumerate() {
        let start = (i as u32) * 32;
        let set = ones.saturating_sub(start).min(32);
        *word = match set {
            0 => 0,
            32 => u32::MAX,
            n => !(u32::MAX >> n),
        };
    }

    Some(total)
}
