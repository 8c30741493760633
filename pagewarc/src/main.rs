// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pagewarc::{read_container, CaptureConfig, ReadFormat, ReadOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pagewarc", version, about = "Archive web pages as WARC files and inspect them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a page and everything it loads into <name>.warc.gz
    Write(WriteArgs),
    /// Print the records of a WARC file
    Read(ReadArgs),
}

#[derive(Args, Debug)]
#[cfg_attr(not(feature = "chromium"), allow(dead_code))]
struct WriteArgs {
    /// Page to capture
    url: String,

    /// Directory for the archive and the screenshot
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Do not save a screenshot
    #[arg(long)]
    no_screenshot: bool,

    /// Navigation timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Write an uncompressed .warc file
    #[arg(long)]
    uncompressed: bool,
}

impl WriteArgs {
    #[cfg_attr(not(feature = "chromium"), allow(dead_code))]
    fn config(&self) -> CaptureConfig {
        CaptureConfig {
            output_dir: self.output_dir.clone(),
            screenshot: !self.no_screenshot,
            navigation_timeout: Duration::from_secs(self.timeout),
            compress: !self.uncompressed,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug)]
struct ReadArgs {
    /// WARC file to read
    path: PathBuf,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,

    /// Report records whose block digest does not match
    #[arg(long)]
    verify_digests: bool,
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn read(args: ReadArgs) -> Result<()> {
    let format: ReadFormat = args.format.parse()?;
    let options = ReadOptions {
        verify_digests: args.verify_digests,
    };
    let readout = read_container(&args.path, &options)?;
    println!("{}", readout.render(format)?);
    Ok(())
}

#[cfg(feature = "chromium")]
fn write(args: WriteArgs) -> Result<()> {
    use anyhow::Context;
    use pagewarc::{capture, ChromiumSession};

    let config = args.config();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let summary = runtime.block_on(async {
        let browser = ChromiumSession::launch(&config).await?;
        capture(browser, &args.url, &config).await
    })?;

    println!("{}", summary.archive.display());
    if let Some(screenshot) = summary.screenshot {
        println!("{}", screenshot.display());
    }
    Ok(())
}

#[cfg(not(feature = "chromium"))]
fn write(_args: WriteArgs) -> Result<()> {
    use clap::CommandFactory;

    let err = Cli::command().error(
        clap::error::ErrorKind::InvalidSubcommand,
        "`write` requires pagewarc to be built with the `chromium` feature",
    );
    let _ = err.print();
    std::process::exit(1);
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging();

    let outcome = match cli.command {
        Command::Write(args) => write(args),
        Command::Read(args) => read(args),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err.downcast_ref::<pagewarc::Error>().map_or("setup", pagewarc::Error::kind);
            eprintln!("error[{kind}]: {err}");
            ExitCode::FAILURE
        }
    }
}
