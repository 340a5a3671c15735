#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use e2a_check::context::AuditContext;
use e2a_check::{AuditConfig, Report, audit_path, config::UUID_IGNORE, open_image, unix_now};
use e2a_ondisk::{GroupDesc, RecordLayout, Superblock, all_layouts};
use e2a_types::{FileKind, InodeNumber};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for fatal errors; 0 and 1 are the audit verdicts.
const EXIT_FATAL: i32 = 2;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "e2a", version, about = "ext2-audit: byte-level conformance checker for ext2 images")]
struct Cli {
    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Audit an image and print every finding.
    Check {
        /// Path to the image.
        image: PathBuf,
        /// JSON audit configuration; missing keys keep their defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output the report as JSON.
        #[arg(long)]
        json: bool,
        /// Also run `e2fsck -f -n` on the image.
        #[arg(long)]
        oracle: bool,
        /// Expected volume name.
        #[arg(long)]
        volume_name: Option<String>,
        /// Skip the UUID check.
        #[arg(long)]
        ignore_uuid: bool,
        /// Seconds a timestamp may lie in the future.
        #[arg(long)]
        skew: Option<u64>,
        /// Judge timestamps against this UNIX time instead of the clock.
        #[arg(long)]
        now: Option<u64>,
    },
    /// Decode and print the superblock, descriptor, inodes and root listing.
    Inspect {
        /// Path to the image.
        image: PathBuf,
        /// JSON audit configuration (for the image size).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Print the on-disk field tables.
    Layout {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
}

// ── Serializable outputs ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InspectOutput {
    block_size: u32,
    superblock: Superblock,
    group_desc: GroupDesc,
    inodes: Vec<InodeSummary>,
    root: Vec<EntrySummary>,
}

#[derive(Debug, Serialize)]
struct InodeSummary {
    ino: u32,
    kind: Option<FileKind>,
    mode: String,
    links_count: u16,
    size: u32,
    blocks: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct EntrySummary {
    name: String,
    inode: u32,
    rec_len: u16,
    file_type: u8,
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Command) -> Result<i32> {
    match command {
        Command::Check {
            image,
            config,
            json,
            oracle,
            volume_name,
            ignore_uuid,
            skew,
            now,
        } => {
            let mut config = load_config(config.as_deref())?;
            if oracle {
                config.oracle = true;
            }
            if let Some(name) = volume_name {
                config.volume_name = name;
            }
            if ignore_uuid {
                UUID_IGNORE.clone_into(&mut config.uuid);
            }
            if let Some(secs) = skew {
                config.timestamp_skew_secs = secs;
            }
            config.validate().context("invalid configuration after flags")?;
            let report = audit_path(&image, &config, now.unwrap_or_else(unix_now))
                .with_context(|| format!("audit of {} aborted", image.display()))?;
            print_report(&report, json)?;
            Ok(report.exit_code())
        }
        Command::Inspect {
            image,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            inspect(&image, &config, json)?;
            Ok(0)
        }
        Command::Layout { json } => {
            layout(json)?;
            Ok(0)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AuditConfig> {
    let Some(path) = path else {
        return Ok(AuditConfig::default());
    };
    let config = AuditConfig::from_json_path(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

// ── check ───────────────────────────────────────────────────────────────────

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json().context("serialize report")?);
    } else {
        println!("{report}");
    }
    Ok(())
}

// ── inspect ─────────────────────────────────────────────────────────────────

fn inspect(path: &Path, config: &AuditConfig, json: bool) -> Result<()> {
    let image = open_image(path, config)
        .with_context(|| format!("failed to open image {}", path.display()))?;
    let ctx = AuditContext::build(&image, config, unix_now())
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let output = summarize(&ctx);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
        return Ok(());
    }

    let sb = &output.superblock;
    println!("ext2-audit inspector");
    println!("block_size: {}", output.block_size);
    println!("inodes_count: {}", sb.inodes_count);
    println!("blocks_count: {}", sb.blocks_count);
    println!(
        "free: {} blocks, {} inodes",
        sb.free_blocks_count, sb.free_inodes_count
    );
    println!("magic: {:#06x}", sb.magic);
    println!("volume_name: {}", sb.volume_name_str());
    println!("uuid: {}", sb.uuid_string());
    let gd = &output.group_desc;
    println!(
        "group 0: block_bitmap={} inode_bitmap={} inode_table={} used_dirs={}",
        gd.block_bitmap, gd.inode_bitmap, gd.inode_table, gd.used_dirs_count
    );
    println!();
    println!("inodes:");
    for inode in &output.inodes {
        let kind = inode.kind.map_or_else(|| "?".to_owned(), |k| k.to_string());
        println!(
            "  {:>4} {:<9} mode={} links={} size={} blocks={:?}",
            inode.ino, kind, inode.mode, inode.links_count, inode.size, inode.blocks
        );
    }
    println!();
    println!("/:");
    for entry in &output.root {
        println!(
            "  {:>4} rec_len={:<4} type={} {}",
            entry.inode, entry.rec_len, entry.file_type, entry.name
        );
    }
    Ok(())
}

fn summarize(ctx: &AuditContext<'_>) -> InspectOutput {
    let inodes = ctx
        .inodes
        .iter()
        .filter(|slot| slot.is_occupied())
        .map(|slot| InodeSummary {
            ino: slot.ino.0,
            kind: slot.inode.kind(),
            mode: format!("{:#o}", slot.inode.mode),
            links_count: slot.inode.links_count,
            size: slot.inode.size,
            blocks: if slot.inode.is_fast_symlink() {
                Vec::new()
            } else {
                slot.inode.data_blocks().iter().map(|b| b.0).collect()
            },
        })
        .collect();

    let root = ctx
        .dirs
        .iter()
        .find(|dir| dir.ino == InodeNumber::ROOT)
        .map(|dir| {
            dir.blocks
                .iter()
                .flat_map(|block| &block.walk.entries)
                .map(|entry| EntrySummary {
                    name: entry.name_str(),
                    inode: entry.inode,
                    rec_len: entry.rec_len,
                    file_type: entry.file_type,
                })
                .collect()
        })
        .unwrap_or_default();

    InspectOutput {
        block_size: ctx.block_size.get(),
        superblock: ctx.sb.clone(),
        group_desc: ctx.gd,
        inodes,
        root,
    }
}

// ── layout ──────────────────────────────────────────────────────────────────

fn layout(json: bool) -> Result<()> {
    let layouts = all_layouts();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&layouts).context("serialize layouts")?
        );
        return Ok(());
    }
    for (i, layout) in layouts.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_layout(layout);
    }
    Ok(())
}

fn print_layout(layout: &RecordLayout) {
    println!("{} ({} bytes)", layout.name, layout.size);
    for field in layout.fields {
        println!(
            "  {:>4}..{:<4} {:<20} {:?}",
            field.offset,
            field.end(),
            field.name,
            field.kind
        );
    }
    for range in layout.reserved_ranges() {
        println!("  {:>4}..{:<4} (reserved, zero)", range.start, range.end);
    }
}
