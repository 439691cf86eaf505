//! chiffre CLI: compile, inspect and decode scan-chain fault images

use chiffre_fault::bits::{BitString, BitsError};
use chiffre_fault::bitstream::BitstreamError;
use chiffre_fault::compiler::{CompileError, CompilerConfig, HeaderKind, ScanChainCompiler};
use chiffre_fault::image::{
    load_binary, save_binary, save_json, save_word_directives, ImageError,
};
use chiffre_fault::policy::{FaultPolicy, PolicyError};
use chiffre_fault::topology::{ChainDescriptor, DescriptorError, TopologyError};
use chiffre_fault::verify::ImageVerifier;
use chiffre_protocol::{cycle_pattern, le_chiffre, LeChiffreOp, DEFAULT_CUSTOM};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use snafu::Snafu;
use std::path::PathBuf;

/// CLI errors for the chiffre binary.
#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("Compile error: {source}"), context(false))]
    Compile { source: CompileError },
    #[snafu(display("Topology error: {source}"), context(false))]
    Topology { source: TopologyError },
    #[snafu(display("Descriptor error: {source}"), context(false))]
    Descriptor { source: DescriptorError },
    #[snafu(display("Policy error: {source}"), context(false))]
    Policy { source: PolicyError },
    #[snafu(display("Image error: {source}"), context(false))]
    Image { source: ImageError },
    #[snafu(display("Decode error: {source}"), context(false))]
    Bitstream { source: BitstreamError },
    #[snafu(display("I/O error: {source}"), context(false))]
    Io { source: std::io::Error },
    #[snafu(display("JSON error: {source}"), context(false))]
    Json { source: serde_json::Error },
    #[snafu(display("{message}"))]
    Other { message: String },
}

#[derive(Parser)]
#[command(name = "chiffre")]
#[command(about = "Scan-chain image compiler for le-chiffre fault injection")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ChainArgs {
    /// Topology descriptor (JSON)
    descriptor: PathBuf,

    /// Chain to process (default: all chains)
    #[arg(long)]
    chain: Option<String>,

    /// Header word derivation
    #[arg(long, value_enum, default_value = "fingerprint")]
    header: HeaderArg,

    /// Images carry a checksum word after the header
    #[arg(long)]
    checksum: bool,
}

#[derive(clap::Args)]
struct PolicyArgs {
    /// Policy file (JSON); flags below override its fields
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Stuck-at select mask (hex)
    #[arg(long, value_parser = parse_hex)]
    mask: Option<BitString>,

    /// Stuck-at forced value (hex)
    #[arg(long, value_parser = parse_hex)]
    stuck_at: Option<BitString>,

    /// Per-bit trigger probability for LFSR injectors
    #[arg(long)]
    probability: Option<f64>,

    /// Seed for the fault-mask stream and LFSR seed registers
    #[arg(long)]
    seed: Option<u64>,

    /// Cycle count for cycle injectors
    #[arg(long)]
    cycle: Option<u64>,

    /// Cycle at which cycle injectors fire
    #[arg(long)]
    cycle_inject: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a fault policy into scan-chain images
    Compile {
        #[command(flatten)]
        chain: ChainArgs,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Output directory for <chain>.bin and friends
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Also write <chain>.S with .word directives
        #[arg(long)]
        asm: bool,

        /// Wrap the .S output in a #define block with this name
        #[arg(long = "macro")]
        r#macro: Option<String>,

        /// Also write <chain>.json with the resolved field values
        #[arg(long)]
        report: bool,

        /// Compile twice and refuse to write differing images
        #[arg(long)]
        verify: bool,
    },

    /// Print the field values stored in an image
    Decode {
        #[command(flatten)]
        chain: ChainArgs,

        /// Binary image to decode
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Show segment fields, offsets and the header word
    Layout {
        #[command(flatten)]
        chain: ChainArgs,
    },

    /// Compare two binary images word by word
    Diff {
        a: PathBuf,
        b: PathBuf,
    },

    /// Encode a le-chiffre control instruction
    Encode {
        #[arg(value_enum)]
        op: OpArg,

        /// Destination register
        #[arg(long, default_value_t = 0)]
        rd: u8,

        /// Source register (default: x10 when the operation reads it, x0 otherwise)
        #[arg(long)]
        rs1: Option<u8>,

        /// Custom opcode slot (0-3)
        #[arg(long, default_value_t = DEFAULT_CUSTOM)]
        custom: u8,
    },

    /// Emit a CYCLE test pattern
    Pattern {
        /// Leading set bits
        #[arg(long)]
        ones: u32,

        /// Pattern length in bits
        #[arg(long)]
        size: u32,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum HeaderArg {
    Fingerprint,
    Length,
}

impl From<HeaderArg> for HeaderKind {
    fn from(arg: HeaderArg) -> Self {
        match arg {
            HeaderArg::Fingerprint => HeaderKind::Fingerprint,
            HeaderArg::Length => HeaderKind::Length,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OpArg {
    Echo,
    Cycle,
    Enable,
    Check,
    WriteSeed,
    WriteDifficulty,
    WriteDuration,
}

impl From<OpArg> for LeChiffreOp {
    fn from(arg: OpArg) -> Self {
        match arg {
            OpArg::Echo => LeChiffreOp::Echo,
            OpArg::Cycle => LeChiffreOp::Cycle,
            OpArg::Enable => LeChiffreOp::Enable,
            OpArg::Check => LeChiffreOp::Check,
            OpArg::WriteSeed => LeChiffreOp::WriteSeed,
            OpArg::WriteDifficulty => LeChiffreOp::WriteDifficulty,
            OpArg::WriteDuration => LeChiffreOp::WriteDuration,
        }
    }
}

fn parse_hex(text: &str) -> Result<BitString, BitsError> {
    BitString::from_hex(text)
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Compile {
            chain,
            policy,
            output_dir,
            asm,
            r#macro,
            report,
            verify,
        } => cmd_compile(chain, policy, output_dir, asm, r#macro, report, verify),
        Commands::Decode { chain, image } => cmd_decode(chain, image),
        Commands::Layout { chain } => cmd_layout(chain),
        Commands::Diff { a, b } => cmd_diff(a, b),
        Commands::Encode {
            op,
            rd,
            rs1,
            custom,
        } => cmd_encode(op.into(), rd, rs1, custom),
        Commands::Pattern { ones, size } => cmd_pattern(ones, size),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_policy(args: PolicyArgs) -> Result<FaultPolicy, CliError> {
    let mut policy = match args.policy {
        Some(path) => FaultPolicy::from_json(&std::fs::read_to_string(path)?)?,
        None => FaultPolicy::default(),
    };
    if let Some(mask) = args.mask {
        policy.mask = mask;
    }
    if let Some(value) = args.stuck_at {
        policy.stuck_at_value = value;
    }
    if let Some(p) = args.probability {
        policy.probability = p;
    }
    if let Some(seed) = args.seed {
        policy.seed = seed;
    }
    if let Some(cycle) = args.cycle {
        policy.cycle = cycle;
    }
    if let Some(at) = args.cycle_inject {
        policy.cycle_inject_at = at;
    }
    policy.validate()?;
    Ok(policy)
}

fn compiler(args: &ChainArgs, verify: bool) -> ScanChainCompiler {
    ScanChainCompiler::new(CompilerConfig {
        header: args.header.into(),
        checksum: args.checksum,
        verify,
    })
}

fn cmd_compile(
    chain: ChainArgs,
    policy: PolicyArgs,
    output_dir: PathBuf,
    asm: bool,
    macro_name: Option<String>,
    report: bool,
    verify: bool,
) -> Result<(), CliError> {
    let descriptor = ChainDescriptor::load(&chain.descriptor)?;
    let policy = load_policy(policy)?;
    let compiler = compiler(&chain, verify);

    // Everything compiles before anything is written.
    let compiled = compiler.compile_descriptor(&descriptor, chain.chain.as_deref(), &policy)?;

    std::fs::create_dir_all(&output_dir)?;
    for c in &compiled {
        let bin = output_dir.join(format!("{}.bin", c.chain));
        save_binary(&c.image, &bin)?;
        info!("wrote {}", bin.display());

        if asm || macro_name.is_some() {
            let path = output_dir.join(format!("{}.S", c.chain));
            save_word_directives(&c.image, macro_name.as_deref(), &path)?;
            info!("wrote {}", path.display());
        }
        if report {
            let path = output_dir.join(format!("{}.json", c.chain));
            save_json(&c.report(), &path)?;
            info!("wrote {}", path.display());
        }

        println!(
            "{}: {} words ({} payload bits), header {:#010x}{}",
            c.chain,
            c.image.word_count(),
            c.image.payload_bits,
            c.image.header,
            c.image
                .checksum
                .map(|s| format!(", checksum {:#010x}", s))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn single_chain(descriptor: &ChainDescriptor, chain: Option<&str>) -> Result<String, CliError> {
    if let Some(name) = chain {
        return Ok(name.to_string());
    }
    let names: Vec<&str> = descriptor.chain_names().collect();
    match names.as_slice() {
        [only] => Ok(only.to_string()),
        _ => Err(CliError::Other {
            message: format!(
                "descriptor has {} chains ({}); pick one with --chain",
                names.len(),
                names.join(", ")
            ),
        }),
    }
}

fn cmd_decode(chain: ChainArgs, image: PathBuf) -> Result<(), CliError> {
    let descriptor = ChainDescriptor::load(&chain.descriptor)?;
    let name = single_chain(&descriptor, chain.chain.as_deref())?;
    let layout = compiler(&chain, false).layout(descriptor.topology(&name)?)?;

    let words = load_binary(&image)?;
    let resolved = layout.decode_words(&words, chain.checksum)?;

    println!("chain {} ({} words, header {:#010x})", name, words.len(), words[0]);
    for segment in &resolved {
        println!("  [{}] {}", segment.position, segment.name);
        for field in &segment.fields {
            println!("      {:<12} {}", field.name, field.value);
        }
    }
    Ok(())
}

fn cmd_layout(chain: ChainArgs) -> Result<(), CliError> {
    let descriptor = ChainDescriptor::load(&chain.descriptor)?;
    let compiler = compiler(&chain, false);
    let topologies = match chain.chain.as_deref() {
        Some(name) => vec![descriptor.topology(name)?],
        None => descriptor.topologies()?,
    };

    for topology in topologies {
        let layout = compiler.layout(topology)?;
        println!(
            "chain {}: {} segments, {} bits, {} header {:#010x}",
            layout.topology().name(),
            layout.segments().len(),
            layout.payload_bits(),
            layout.header_name(),
            layout.header()
        );
        for segment in layout.segments() {
            println!(
                "  [{}] {} ({} bits) {}",
                segment.position, segment.name, segment.bit_width, segment.kind
            );
            for field in &segment.fields {
                println!(
                    "      {:<12} width {:>3}  offset {:>3}  {:?}",
                    field.name, field.width, field.offset, field.binding
                );
            }
            if segment.padding > 0 {
                println!("      {:<12} width {:>3}  offset {:>3}", "(padding)", segment.padding, 0);
            }
        }
    }
    Ok(())
}

fn cmd_diff(a: PathBuf, b: PathBuf) -> Result<(), CliError> {
    let words_a = load_binary(&a)?;
    let words_b = load_binary(&b)?;
    let result = ImageVerifier::compare(&words_a, &words_b);
    print!("{}", result);

    let divergences = ImageVerifier::divergences(&words_a, &words_b);
    if divergences.len() > 1 {
        println!("\n{} words differ in total:", divergences.len());
        for d in &divergences {
            println!(
                "  word {:>5}: {} vs {}",
                d.word_index,
                fmt_word(d.word_a),
                fmt_word(d.word_b)
            );
        }
    }

    if result.is_identical {
        Ok(())
    } else {
        Err(CliError::Other {
            message: format!("{} and {} differ", a.display(), b.display()),
        })
    }
}

fn fmt_word(word: Option<u32>) -> String {
    word.map(|w| format!("{:#010x}", w))
        .unwrap_or_else(|| "<ended>".to_string())
}

fn cmd_encode(op: LeChiffreOp, rd: u8, rs1: Option<u8>, custom: u8) -> Result<(), CliError> {
    let rs1 = rs1.unwrap_or(op.default_rs1());
    let word = le_chiffre(op, custom, rd, rs1).ok_or_else(|| CliError::Other {
        message: format!(
            "cannot encode {} with custom {}, rd x{}, rs1 x{}",
            op.mnemonic(),
            custom,
            rd,
            rs1
        ),
    })?;
    println!(".word 0x{:08x}  # {} rd=x{} rs1=x{}", word, op.mnemonic(), rd, rs1);
    Ok(())
}

fn cmd_pattern(ones: u32, size: u32) -> Result<(), CliError> {
    let mut buf = vec![0u32; 1 + size.div_ceil(32) as usize];
    let written = cycle_pattern(ones, size, &mut buf).ok_or_else(|| CliError::Other {
        message: format!("{} set bits do not fit a {}-bit pattern", ones, size),
    })?;
    for word in &buf[..written] {
        println!(".word 0x{:08x}", word);
    }
    Ok(())
}
