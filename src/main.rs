//! `ahdfs` command-line entry point
//!
//! Serves a local directory (`--root`) through the blocking client interface
//! and runs one remote operation on a compio runtime.

use ahdfs::cli::{listing_line, status_report, Args, Command};
use ahdfs::{copy_from_local, copy_to_local, Client, LocalClient};
use anyhow::{Context, Result};
use clap::Parser;
use compio::driver::ProactorBuilder;
use compio::runtime::RuntimeBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::process::ExitCode;
use tracing::debug;

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    args.validate()?;

    tracing_subscriber::fmt()
        .with_max_level(args.output.log_level())
        .with_writer(std::io::stderr)
        .init();

    let workers = args.bridge.effective_workers();
    debug!(workers, root = %args.remote.root.display(), "starting runtime");
    let mut proactor = ProactorBuilder::new();
    proactor.thread_pool_limit(workers);
    let runtime = RuntimeBuilder::new()
        .with_proactor(proactor)
        .build()
        .context("Failed to build compio runtime")?;

    runtime.block_on(run(&args))
}

async fn run(args: &Args) -> Result<ExitCode> {
    let client = Client::new(
        LocalClient::new(args.remote.root.clone()),
        args.client_options(),
    );
    let result = execute(&client, args).await;
    client.disconnect().await.context("Failed to disconnect")?;
    result
}

async fn execute(client: &Client<LocalClient>, args: &Args) -> Result<ExitCode> {
    match &args.command {
        Command::Stat { path } => {
            let status = client.stat(path).await?;
            println!("{}", status_report(&status));
        }
        Command::Ls { path } => {
            let listing = client.list(path).await?;
            for status in &listing {
                println!("{}", listing_line(status));
            }
        }
        Command::Mkdir { path } => {
            if !client.mkdir(path).await? {
                anyhow::bail!("Failed to create directory: {path}");
            }
        }
        Command::Rm { path } => {
            if !client.delete(path).await? {
                anyhow::bail!("Failed to delete: {path}");
            }
        }
        Command::Exists { path } => {
            let exists = client.exists(path).await?;
            if !args.output.quiet {
                println!("{exists}");
            }
            return Ok(if exists {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Command::Cat { path } => {
            let mut reader = client.reader(path).await?;
            let mut stdout = std::io::stdout().lock();
            while let Some(chunk) = reader.next_chunk().await? {
                stdout.write_all(&chunk).context("Failed to write to stdout")?;
            }
            stdout.flush().context("Failed to flush stdout")?;
        }
        Command::Get { remote, local } => {
            let total = client.stat(remote).await?.size;
            let bar = progress_bar(args.output.progress, total, &format!("get {remote}"))?;
            let copied = copy_to_local(client, remote, local, |done| bar.set_position(done))
                .await
                .with_context(|| format!("Failed to copy {remote} to {}", local.display()))?;
            bar.finish_and_clear();
            if !args.output.quiet {
                println!("{copied} bytes");
            }
        }
        Command::Put { local, remote } => {
            let total = std::fs::metadata(local)
                .with_context(|| format!("Failed to stat {}", local.display()))?
                .len();
            let bar = progress_bar(args.output.progress, total, &format!("put {remote}"))?;
            let copied = copy_from_local(client, local, remote, |done| bar.set_position(done))
                .await
                .with_context(|| format!("Failed to copy {} to {remote}", local.display()))?;
            bar.finish_and_clear();
            if !args.output.quiet {
                println!("{copied} bytes");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn progress_bar(enabled: bool, total: u64, message: &str) -> Result<ProgressBar> {
    if !enabled {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")?
            .progress_chars("#>-"),
    );
    bar.set_message(message.to_string());
    Ok(bar)
}
