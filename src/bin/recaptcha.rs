//! reCAPTCHA CLI - Command-line driver for the native verification engine
//!
//! Commands:
//! - call: Dispatch a single method call against a fresh engine
//! - run: Stateful method-channel session over NDJSON on stdin/stdout
//! - fingerprint: Print the device fingerprint
//! - config: Print the effective engine configuration
//! - doctor: Diagnose platform and configuration health

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use recaptcha_native::logging::{init_logging, LogFormat};
use recaptcha_native::{
    Dispatcher, EngineConfig, EngineError, Method, MethodCall, MethodResponse,
    VerificationEngine, CHANNEL_NAME, ENGINE_VERSION,
};

/// recaptcha - Native verification-session engine
#[derive(Parser)]
#[command(name = "recaptcha")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Drive the reCAPTCHA verification engine from the command line", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); defaults to RECAPTCHA_* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, default_value = "human")]
    log_format: LogFormatArg,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a single method call against a fresh engine
    Call {
        /// Method name (e.g. verify, getDeviceFingerprint)
        #[arg(short, long)]
        method: String,

        /// Arguments as a JSON value
        #[arg(short, long)]
        args: Option<String>,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },

    /// Stateful session: one JSON method call per stdin line, one response per stdout line
    Run {
        /// Flush output after each response
        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        flush: bool,
    },

    /// Print the device fingerprint
    Fingerprint,

    /// Print the effective engine configuration
    Config,

    /// Diagnose platform and configuration health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum LogFormatArg {
    /// Human-readable log lines
    Human,
    /// Newline-delimited JSON log lines
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = match cli.log_format {
        LogFormatArg::Human => LogFormat::Human,
        LogFormatArg::Json => LogFormat::Json,
    };
    init_logging(format, &cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RecaptchaCliError> {
    match cli.command {
        // Doctor reports a broken config instead of failing on it
        Commands::Doctor { json } => cmd_doctor(cli.config.as_deref(), json),
        Commands::Call {
            method,
            args,
            pretty,
        } => cmd_call(
            load_config(cli.config.as_deref())?,
            &method,
            args.as_deref(),
            pretty,
        ),
        Commands::Run { flush } => cmd_run(load_config(cli.config.as_deref())?, flush),
        Commands::Fingerprint => {
            let engine = VerificationEngine::with_config(load_config(cli.config.as_deref())?)?;
            println!("{}", engine.device_fingerprint());
            Ok(())
        }
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, RecaptchaCliError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => {
            let config = EngineConfig::from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

fn cmd_call(
    config: EngineConfig,
    method: &str,
    args: Option<&str>,
    pretty: bool,
) -> Result<(), RecaptchaCliError> {
    let arguments = match args {
        Some(json) => Some(serde_json::from_str::<serde_json::Value>(json)?),
        None => None,
    };

    let dispatcher = Dispatcher::new(VerificationEngine::with_config(config)?);
    let response = dispatcher.handle(method, arguments.as_ref());

    let output = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", output);

    match response {
        MethodResponse::Error { code, message, .. } => {
            Err(RecaptchaCliError::MethodFailed(code, message))
        }
        _ => Ok(()),
    }
}

fn cmd_run(config: EngineConfig, flush: bool) -> Result<(), RecaptchaCliError> {
    let dispatcher = Dispatcher::new(VerificationEngine::with_config(config)?);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handled = 0usize;

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        // Bad lines get an error envelope; the session keeps going
        let response = match serde_json::from_str::<MethodCall>(trimmed) {
            Ok(call) => dispatcher.handle_call(&call),
            Err(e) => MethodResponse::from(EngineError::from(e)),
        };

        writeln!(stdout, "{}", response.to_json())?;
        if flush {
            stdout.flush()?;
        }
        handled += 1;
    }

    stdout.flush()?;
    tracing::info!(handled, "method channel session closed");
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), RecaptchaCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Engine version {}", ENGINE_VERSION),
    });

    // Configuration
    let config = match config_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => match EngineConfig::from_json(&content) {
                Ok(config) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!("Config file {} valid", path.display()),
                    });
                    Some(config)
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    });
                    None
                }
            },
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                });
                None
            }
        },
        None => {
            let config = EngineConfig::from_env();
            match config.validate() {
                Ok(()) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: "Using environment configuration".to_string(),
                    });
                    Some(config)
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    });
                    None
                }
            }
        }
    };

    // Platform capabilities
    let engine = VerificationEngine::with_config(config.unwrap_or_default())?;
    checks.push(DoctorCheck {
        name: "platform".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} ({})", engine.platform_name(), engine.platform_version()),
    });
    checks.push(DoctorCheck {
        name: "biometric".to_string(),
        status: if engine.is_biometric_available() {
            CheckStatus::Ok
        } else {
            CheckStatus::Warning
        },
        message: if engine.is_biometric_available() {
            "Biometric prompt available".to_string()
        } else {
            "Biometric prompt unavailable; behavioral challenges will be used".to_string()
        },
    });

    // A full behavioral round trip must be accepted by the state machine
    let dispatcher = Dispatcher::new(engine);
    let round_trip = [
        Method::StartBehavioralAnalysis,
        Method::StopBehavioralAnalysis,
        Method::Reset,
    ]
    .iter()
    .all(|m| dispatcher.handle(m.name(), None).is_success());
    checks.push(DoctorCheck {
        name: "state_machine".to_string(),
        status: if round_trip {
            CheckStatus::Ok
        } else {
            CheckStatus::Error
        },
        message: if round_trip {
            "Behavioral round trip accepted".to_string()
        } else {
            "Behavioral round trip rejected".to_string()
        },
    });

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (run mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        channel: CHANNEL_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("reCAPTCHA Doctor Report");
        println!("=======================");
        println!("Channel: {}", report.channel);
        println!("Version: {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RecaptchaCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum RecaptchaCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    MethodFailed(String, String),
    DoctorFailed,
}

impl From<io::Error> for RecaptchaCliError {
    fn from(e: io::Error) -> Self {
        RecaptchaCliError::Io(e)
    }
}

impl From<EngineError> for RecaptchaCliError {
    fn from(e: EngineError) -> Self {
        RecaptchaCliError::Engine(e)
    }
}

impl From<serde_json::Error> for RecaptchaCliError {
    fn from(e: serde_json::Error) -> Self {
        RecaptchaCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RecaptchaCliError> for CliError {
    fn from(e: RecaptchaCliError) -> Self {
        match e {
            RecaptchaCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RecaptchaCliError::Engine(e) => CliError {
                code: e.code().to_string(),
                message: e.to_string(),
                hint: Some("Run 'recaptcha doctor' for details".to_string()),
            },
            RecaptchaCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RecaptchaCliError::MethodFailed(code, message) => CliError {
                code,
                message,
                hint: Some("Use 'recaptcha run' to call methods in sequence".to_string()),
            },
            RecaptchaCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    channel: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flushes_by_default() {
        let cli = Cli::try_parse_from(["recaptcha", "run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { flush: true }));
    }

    #[test]
    fn test_run_flush_can_be_disabled() {
        let cli = Cli::try_parse_from(["recaptcha", "run", "--flush", "false"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { flush: false }));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["recaptcha", "doctor", "--json", "--log-level", "debug"])
            .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Doctor { json: true }));
    }
}
