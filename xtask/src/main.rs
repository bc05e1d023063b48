//! Build automation for flink-kube
//!
//! Usage: cargo xtask <command>
//!
//! Available commands:
//! - build: Build the project
//! - test: Run unit and/or integration tests
//! - dist: Package the release binary
//! - ci: Run CI checks

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Shell};

const BINARY: &str = "flink-kube";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for flink-kube")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
    /// Run tests
    Test {
        /// Run only the integration tests against the in-memory control plane
        #[arg(long, conflicts_with = "unit")]
        integration: bool,
        /// Run only the library unit tests
        #[arg(long)]
        unit: bool,
    },
    /// Package the release binary as a tarball
    Dist {
        /// Target triple (e.g., x86_64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },
    /// Run CI checks (format, clippy, test)
    Ci,
    /// Format code
    Format {
        /// Check formatting without modifying files
        #[arg(long)]
        check: bool,
    },
    /// Run clippy
    Clippy,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    sh.change_dir(project_root()?);

    match cli.command {
        Commands::Build { release } => build(&sh, release),
        Commands::Test { integration, unit } => test(&sh, integration, unit),
        Commands::Dist { target } => dist(&sh, target),
        Commands::Ci => ci(&sh),
        Commands::Format { check } => format(&sh, check),
        Commands::Clippy => clippy(&sh),
    }
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("Building {}...", BINARY);

    if release {
        cmd!(sh, "cargo build --release -p flink-kube").run()?;
        println!("Release build completed: target/release/{}", BINARY);
    } else {
        cmd!(sh, "cargo build -p flink-kube").run()?;
        println!("Debug build completed: target/debug/{}", BINARY);
    }

    Ok(())
}

fn test(sh: &Shell, integration: bool, unit: bool) -> Result<()> {
    println!("Running tests...");

    if integration {
        cmd!(sh, "cargo test -p flink-kube --test cluster_client_test").run()?;
    } else if unit {
        cmd!(sh, "cargo test -p flink-kube --lib").run()?;
    } else {
        cmd!(sh, "cargo test --all").run()?;
    }

    println!("All tests passed");
    Ok(())
}

fn dist(sh: &Shell, target: Option<String>) -> Result<()> {
    println!("Creating distribution package...");

    let binary_src = match target {
        Some(ref target_triple) => {
            cmd!(sh, "cargo build --release -p flink-kube --target {target_triple}").run()?;
            project_root()?.join(format!("target/{}/release/{}", target_triple, BINARY))
        }
        None => {
            cmd!(sh, "cargo build --release -p flink-kube").run()?;
            project_root()?.join(format!("target/release/{}", BINARY))
        }
    };

    let dist_dir = project_root()?.join("dist");
    sh.create_dir(&dist_dir)?;
    sh.copy_file(&binary_src, dist_dir.join(BINARY))?;

    let version = env!("CARGO_PKG_VERSION");
    let archive_name = format!("{}-{}.tar.gz", BINARY, version);

    cmd!(sh, "tar -czf {archive_name} -C dist {BINARY}")
        .run()
        .context("Failed to create tarball")?;

    println!("Distribution package created: {}", archive_name);
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    println!("Running CI checks...");

    println!("\nChecking formatting...");
    format(sh, true)?;

    println!("\nRunning clippy...");
    clippy(sh)?;

    println!("\nRunning tests...");
    test(sh, false, false)?;

    println!("\nAll CI checks passed!");
    Ok(())
}

fn format(sh: &Shell, check: bool) -> Result<()> {
    if check {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
        println!("Code formatting is correct");
    } else {
        cmd!(sh, "cargo fmt --all").run()?;
        println!("Code formatted");
    }
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --all-targets --all-features -- -D warnings").run()?;
    println!("Clippy checks passed");
    Ok(())
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask must live one level below the workspace root")
}
