use anyhow::{Context, Result};
use atscript::{AtError, AtResponse, CommunicatorConfig, LineBreak, Runtime};
use clap::{ArgAction, Parser};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "atscript",
    about = "Run an AT command script against a modem or RF module",
    version
)]
struct Args {
    /// Script to run; without one, lines are read from stdin
    script: Option<PathBuf>,

    /// Serial device path
    #[arg(short = 'p', long)]
    device: Option<String>,

    /// Baud rate
    #[arg(short = 'b', long)]
    baud_rate: Option<u32>,

    /// Default command timeout in seconds (0 keeps the built-in default)
    #[arg(short = 'T', long, default_value_t = 0)]
    timeout: i64,

    /// Line break appended to every command: CRLF, LF, CR or NONE
    #[arg(short = 'B', long = "break", default_value = "CRLF")]
    line_break: LineBreak,

    /// Abort on failure
    #[arg(short = 'A', long, default_value = "true", action = ArgAction::Set, value_parser = parse_flag)]
    abort_on_failure: bool,

    /// Log to this file ("stdout" logs to standard output)
    #[arg(short = 'L', long)]
    log_file: Option<String>,

    /// Log level: 0 critical, 1 error, 2 warn, 3 info, 4 debug
    #[arg(short = 'l', long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=4))]
    log_level: u8,

    /// Be more verbose
    #[arg(short, long)]
    verbose: bool,

    /// Print only PRINT output and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Whether responses go to stdout; they would interleave with logs there.
    fn echo(&self) -> bool {
        !self.quiet && self.log_file.as_deref() != Some("stdout")
    }
}

fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected true or false, got '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args)?;

    let mut runtime = Runtime::new(args.abort_on_failure);
    let config = CommunicatorConfig::new(args.device.as_deref(), args.baud_rate)
        .with_default_timeout(args.timeout)
        .with_line_break(args.line_break);
    let ready = config.is_complete();
    runtime
        .configure_communicator(config)
        .context("Failed to configure communicator")?;
    if ready {
        info!("Setup communicator ({:?} at {:?} baud)", args.device, args.baud_rate);
        if args.verbose {
            println!("Setup communicator ({:?} at {:?} baud)", args.device, args.baud_rate);
        }
        match runtime.open() {
            Ok(()) => {
                if args.verbose {
                    println!("Serial port opened");
                }
            }
            Err(e) => {
                error!("Could not open serial port: {}", e);
                if !args.quiet {
                    eprintln!("Could not open serial port: {e}");
                }
            }
        }
    }

    let clean = match &args.script {
        Some(path) => {
            runtime
                .parse_script(path)
                .with_context(|| format!("Failed to load script: {}", path.display()))?;
            run_script(&mut runtime, &args).await
        }
        None => run_interactive(&mut runtime, &args).await?,
    };

    match runtime.close() {
        Ok(()) => {}
        Err(AtError::Uninitialized(_)) => {
            if args.verbose {
                println!("No device was configured");
            }
        }
        Err(e) => {
            error!("Could not close serial port: {}", e);
            eprintln!("Could not close serial port: {e}");
            return Ok(ExitCode::FAILURE);
        }
    }
    info!("atscript terminated");
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level {
        0 | 1 => "error",
        2 => "warn",
        3 => "info",
        _ => "debug",
    };
    match args.log_file.as_deref() {
        Some("stdout") => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(level))
            .with_writer(std::io::stdout)
            .init(),
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {path}"))?;
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(level))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")))
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

/// Execute the loaded script step by step. Returns `false` if a step failed
/// or the run was interrupted.
async fn run_script(runtime: &mut Runtime, args: &Args) -> bool {
    loop {
        let step = tokio::select! {
            step = runtime.exec_next() => step,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                eprintln!("Interrupted");
                return false;
            }
        };
        match step {
            Ok(Some(response)) => report(&response, "", args),
            Ok(None) => return true,
            Err(e) => {
                error!("{}", e);
                eprintln!("{e}");
                return false;
            }
        }
    }
}

/// Read lines from stdin and execute each one until EOF or Ctrl-C.
async fn run_interactive(runtime: &mut Runtime, args: &Args) -> Result<bool> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!(">> ");
        std::io::stdout().flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let outcome = tokio::select! {
            outcome = runtime.exec(line) => outcome,
            _ = tokio::signal::ctrl_c() => break,
        };
        match outcome {
            Ok(Some(response)) => report(&response, "<< ", args),
            Ok(None) => {
                info!("{} >> OK", line);
                if args.echo() {
                    println!("{line} >> OK");
                }
            }
            Err(e) => {
                error!("{}", e);
                eprintln!("{e}");
            }
        }
    }
    println!();
    Ok(true)
}

fn report(response: &AtResponse, prefix: &str, args: &Args) {
    let answer = match &response.response {
        Some(line) => {
            info!("{} ({} ms) >> {}", response.command, response.execution_time(), line);
            line.clone()
        }
        None => {
            let full = response.full_response.join("\n");
            error!("{} ({} ms) >> {}", response.command, response.execution_time(), full);
            full
        }
    };
    if args.echo() {
        println!(
            "{prefix}{} ({} ms) >> {answer}",
            response.command,
            response.execution_time()
        );
    }
}
