#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use e2a_harness::{REFERENCE_FIXTURE, audit_fixture, extract_sparse_fixture, fixture_path};
use std::env;
use std::fs;
use std::path::Path;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str);

    match cmd {
        Some("check-fixtures") => check_fixtures(&args[1..]),
        Some("generate-fixture") => generate_fixture(&args[1..]),
        Some("--help" | "-h" | "help") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}")
        }
    }
}

fn check_fixtures(args: &[String]) -> Result<()> {
    let paths: Vec<_> = if args.is_empty() {
        vec![fixture_path(REFERENCE_FIXTURE)]
    } else {
        args.iter().map(|arg| Path::new(arg).to_path_buf()).collect()
    };

    let mut failed = 0_usize;
    for path in &paths {
        let report = audit_fixture(path)?;
        println!(
            "{}: {} error(s), {} warning(s): {}",
            path.display(),
            report.errors,
            report.warnings,
            report.verdict
        );
        for finding in &report.findings {
            println!("  {finding}");
        }
        if !report.verdict.is_pass() {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} fixture(s) failed the audit");
    }
    Ok(())
}

fn generate_fixture(args: &[String]) -> Result<()> {
    let Some(image) = args.first() else {
        bail!("usage: e2a-harness generate-fixture <image> [<len>]");
    };

    let image_path = Path::new(image);
    let mut data =
        fs::read(image_path).with_context(|| format!("failed to read {}", image_path.display()))?;

    if let Some(raw) = args.get(1) {
        let len: usize = raw.parse().context("invalid len")?;
        if len > data.len() {
            bail!("image is {} bytes, shorter than {len}", data.len());
        }
        data.truncate(len);
    }

    let fixture = extract_sparse_fixture(&data);
    eprintln!(
        "{} byte(s) in {} write(s)",
        fixture.size,
        fixture.writes.len()
    );
    println!("{}", serde_json::to_string_pretty(&fixture)?);
    Ok(())
}

fn print_usage() {
    println!("e2a-harness: fixture management for ext2-audit");
    println!();
    println!("USAGE:");
    println!("  e2a-harness check-fixtures [<fixture.json>...]");
    println!("  e2a-harness generate-fixture <image> [<len>]");
    println!();
    println!("FIXTURES:");
    println!("  check-fixtures audits each sparse fixture (default: the reference image)");
    println!("  and fails if any has an ERROR finding.");
    println!("  generate-fixture prints the non-zero runs of an image as sparse JSON.");
    println!();
    println!("EXAMPLES:");
    println!("  e2a-harness generate-fixture cs111-base.img > conformance/fixtures/cs111_base.json");
    println!("  e2a-harness check-fixtures conformance/fixtures/cs111_base.json");
}
