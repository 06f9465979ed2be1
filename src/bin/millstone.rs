//! Command-line entry point.
//!
//! The flag surface follows the YCSB tradition (single-dash long options),
//! which rules out derive-style parsers; the loop below is the whole
//! grammar. Properties files are applied in order, then every command-line
//! override on top.

use std::process::ExitCode;

use anyhow::{bail, Context};

use millstone::{Config, Runner};

fn usage() {
    eprintln!("Usage: millstone [options]");
    eprintln!("Options:");
    eprintln!("  -threads n      execute using n worker tasks (property: threadcount)");
    eprintln!("  -target n       attempt n operations per second in total (property: target)");
    eprintln!("  -load           run the load stage of the workload");
    eprintln!("  -t              run the transactions stage of the workload (default)");
    eprintln!("  -db name        storage adapter to drive (default: noop)");
    eprintln!("  -P file         load a properties file; repeatable, later files win");
    eprintln!("  -p key=value    set a single property; overrides any file");
    eprintln!("  -s              print status lines during the run");
    eprintln!("  -l label        prefix status lines with a label");
    eprintln!();
    eprintln!("Required property:");
    eprintln!("  workload        must name a known workload (core)");
}

fn parse_args(args: &[String]) -> anyhow::Result<Config> {
    let mut config = Config::new();
    // Command-line settings beat properties files regardless of position,
    // so collect them and apply after every file has loaded.
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut index = 0;
    let value = |index: &mut usize, flag: &str| -> anyhow::Result<String> {
        *index += 1;
        args.get(*index)
            .cloned()
            .with_context(|| format!("missing argument value for {flag}"))
    };

    while index < args.len() {
        match args[index].as_str() {
            "-threads" => {
                let n = value(&mut index, "-threads")?;
                overrides.push(("threadcount".to_string(), n));
            }
            "-target" => {
                let n = value(&mut index, "-target")?;
                overrides.push(("target".to_string(), n));
            }
            "-load" => overrides.push(("stage".to_string(), "load".to_string())),
            "-t" => overrides.push(("stage".to_string(), "transactions".to_string())),
            "-db" => {
                let name = value(&mut index, "-db")?;
                overrides.push(("db".to_string(), name));
            }
            "-P" => {
                let path = value(&mut index, "-P")?;
                config
                    .load_file(&path)
                    .with_context(|| format!("failed to load properties file `{path}`"))?;
            }
            "-p" => {
                let pair = value(&mut index, "-p")?;
                let Some((key, val)) = pair.split_once('=') else {
                    bail!("argument to -p must be key=value, got `{pair}`");
                };
                overrides.push((key.to_string(), val.to_string()));
            }
            "-s" => overrides.push(("status".to_string(), "true".to_string())),
            "-l" => {
                let label = value(&mut index, "-l")?;
                overrides.push(("label".to_string(), label));
            }
            "-help" | "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            other => bail!("unknown option `{other}`"),
        }
        index += 1;
    }

    for (key, val) in overrides {
        config.set(&key, &val);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
        eprintln!();
        eprintln!("At least the `workload` property is required.");
        return ExitCode::FAILURE;
    }

    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(err) => {
            usage();
            eprintln!();
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    if config.get("workload").is_none() {
        usage();
        eprintln!();
        eprintln!("Missing property: workload");
        return ExitCode::FAILURE;
    }

    match Runner::builder().config(config).build().run().await {
        Ok(summary) => {
            tracing::info!(
                operations = summary.operations,
                runtime_ms = summary.runtime_ms,
                throughput = format!("{:.2}", summary.throughput),
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}
