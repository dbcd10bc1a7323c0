//! driftscan - Container Environment Drift Auditor CLI
//!
//! Analyzes differences in a container environment before and after
//! executing specified operations, generating a JSON report detailing
//! file system changes, command output variations, and execution results.
//!
//! ## Usage
//!
//! ```sh
//! driftscan run [--input <config.yaml>] [--output <report.json>]
//!               [--container-tool podman|docker] [--verbose]
//! driftscan render <report.json>
//! ```
//!
//! `run` drives a full analysis; `render` converts an existing JSON
//! report to human-readable text on stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use driftscan::container::ContainerTool;
use driftscan::report::render_report_file;
use driftscan::run_analysis;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Run {
        input: PathBuf,
        output: PathBuf,
        tool: ContainerTool,
        verbose: bool,
    },
    Render {
        report: PathBuf,
    },
    Version,
    Help,
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "run" => {
            let mut input = PathBuf::from("input.yaml");
            let mut output = PathBuf::from("output.json");
            let mut tool = ContainerTool::default();
            let mut verbose = false;
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--input" | "-i" => {
                        if i + 1 < args.len() {
                            input = PathBuf::from(&args[i + 1]);
                            i += 2;
                        } else {
                            return Err("--input requires a path".to_string());
                        }
                    }
                    "--output" | "-o" => {
                        if i + 1 < args.len() {
                            output = PathBuf::from(&args[i + 1]);
                            i += 2;
                        } else {
                            return Err("--output requires a path".to_string());
                        }
                    }
                    "--container-tool" | "-t" => {
                        if i + 1 < args.len() {
                            tool = ContainerTool::parse(&args[i + 1]).ok_or_else(|| {
                                format!("unknown container tool: {}", args[i + 1])
                            })?;
                            i += 2;
                        } else {
                            return Err("--container-tool requires a value".to_string());
                        }
                    }
                    "--verbose" | "-v" => {
                        verbose = true;
                        i += 1;
                    }
                    unknown => return Err(format!("unknown option: {}", unknown)),
                }
            }
            Ok(Command::Run {
                input,
                output,
                tool,
                verbose,
            })
        }
        "render" => {
            if args.len() < 3 {
                return Err("render requires <report.json>".to_string());
            }
            Ok(Command::Render {
                report: PathBuf::from(&args[2]),
            })
        }
        "version" | "--version" | "-V" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        unknown => Err(format!("unknown command: {}", unknown)),
    }
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_run(input: PathBuf, output: PathBuf, tool: ContainerTool) -> driftscan::Result<()> {
    run_analysis(&input, &output, tool)
}

fn cmd_render(report: PathBuf) -> driftscan::Result<()> {
    let text = render_report_file(&report)?;
    print!("{text}");
    Ok(())
}

fn cmd_version() {
    println!("driftscan version {}", env!("CARGO_PKG_VERSION"));
}

fn cmd_help() {
    println!(
        r#"driftscan - audits what an operation changes inside a container

USAGE:
    driftscan <command> [options]

COMMANDS:
    run                  Run an analysis and write the JSON report
    render <report>      Render an existing JSON report as text
    version              Show version info
    help                 Show this help

RUN OPTIONS:
    --input, -i <path>          Input YAML configuration (default: input.yaml)
    --output, -o <path>         Output JSON report (default: output.json)
    --container-tool, -t <name> Container runtime: podman or docker (default: podman)
    --verbose, -v               Enable verbose logging (DEBUG level)

EXAMPLES:
    driftscan run --input audit.yaml --output report.json
    driftscan run -t docker -v
    driftscan render report.json
"#
    );
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    match parse_args() {
        Ok(cmd) => {
            let result = match cmd {
                Command::Run {
                    input,
                    output,
                    tool,
                    verbose,
                } => {
                    init_logging(verbose);
                    cmd_run(input, output, tool)
                }
                Command::Render { report } => {
                    init_logging(false);
                    cmd_render(report)
                }
                Command::Version => {
                    cmd_version();
                    Ok(())
                }
                Command::Help => {
                    cmd_help();
                    Ok(())
                }
            };

            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{e}");
                    println!("Error: {e}. Check logs for details.");
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            cmd_help();
            ExitCode::FAILURE
        }
    }
}
