use rera_status_lib::{logger, BatchRunner, ScraperConfig};

use std::env;
use std::error::Error;
use std::path::PathBuf;
use log::{info, error};

const USAGE: &str = "\
Usage: rera_status_scraper [options]

  -i, --input <file>      registration list (.csv or .xlsx) [WB_input.csv]
  -o, --output <file>     status CSV to append to [construction_status.csv]
  -f, --failures <file>   failure log [failed_registrations.txt]
  -c, --config <file>     JSON config [scraper_config.json if present]
      --headless          run Chrome without a window
  -h, --help              show this help";

#[derive(Default)]
struct Cli {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    failures: Option<PathBuf>,
    config: Option<PathBuf>,
    headless: bool,
}

fn main() {
    logger::init();

    if let Err(e) = run() {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = parse_cli()?;
    info!("Starting construction status scraper...");

    let mut config = ScraperConfig::load(cli.config.as_deref())?;
    if let Some(input) = cli.input {
        config.input_path = input;
    }
    if let Some(output) = cli.output {
        config.output_path = output;
    }
    if let Some(failures) = cli.failures {
        config.failure_log_path = failures;
    }
    if cli.headless {
        config.browser.headless = true;
    }

    let input = config.input_path.clone();
    let output = config.output_path.clone();
    let runner = BatchRunner::new(config);
    let summary = runner.run(&input, &output)?;

    if summary.failed > 0 {
        info!(
            "{} registrations failed; see {:?}",
            summary.failed,
            runner.config().failure_log_path
        );
    }
    Ok(())
}

fn parse_cli() -> Result<Cli, Box<dyn Error>> {
    let mut cli = Cli::default();
    let mut args = env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "-i" | "--input" => cli.input = Some(PathBuf::from(args.next().ok_or("Missing input file")?)),
            "-o" | "--output" => cli.output = Some(PathBuf::from(args.next().ok_or("Missing output file")?)),
            "-f" | "--failures" => cli.failures = Some(PathBuf::from(args.next().ok_or("Missing failure log file")?)),
            "-c" | "--config" => cli.config = Some(PathBuf::from(args.next().ok_or("Missing config file")?)),
            "--headless" => cli.headless = true,
            "-h" | "--help" => {
                eprintln!("{}", USAGE);
                std::process::exit(0);
            }
            _ => return Err(format!("Unknown arg: {}", a).into()),
        }
    }
    Ok(cli)
}
