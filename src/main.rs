//! pdx-cdr command line interface
//!
//! Sanitizes one document (or stdin) into a clean copy (or stdout) and
//! optionally prints the report as JSON.

use std::{path::Path, process};

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use pdx_cdr::{
    config::{BleachConfig, UnrecognizedPolicy},
    error::{Result, SanitizeError},
    pipeline::Pipeline,
    report::{ReportFormat, ReportFormatter, SanitizeReport},
    utils::{init_logging, LogLevel},
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    let json = matches.get_flag("json");

    // JSON output owns stderr, so logging stays off
    if !json {
        let level = LogLevel::from_verbosity(matches.get_count("verbose"));
        if let Err(e) = init_logging(level, false) {
            eprintln!("{}", e);
        }
    }

    match run(&matches).await {
        Ok(report) => {
            if json {
                match ReportFormatter::format(&report, ReportFormat::Json) {
                    Ok(text) => eprintln!("{}", text),
                    Err(e) => {
                        eprintln!("{}", e);
                        process::exit(e.exit_code());
                    }
                }
            }
        }
        Err(e) => {
            error!("Sanitization failed: {}", e);
            if json {
                eprintln!("{{\"error\": {}}}", serde_json::Value::String(e.to_string()));
            }
            process::exit(e.exit_code());
        }
    }
}

async fn run(matches: &ArgMatches) -> Result<SanitizeReport> {
    let config = load_config(matches)?;
    let input = matches
        .get_one::<String>("input")
        .ok_or_else(|| SanitizeError::ConfigError("missing input".into()))?;
    let output = matches
        .get_one::<String>("output")
        .ok_or_else(|| SanitizeError::ConfigError("missing output".into()))?;

    let pipeline = Pipeline::new(config)?.force(matches.get_flag("force"));
    let report = pipeline.execute(input, output).await?;

    info!(
        threats = report.threat_count,
        worst = ?report.worst_severity,
        "Sanitized {} into {}",
        input,
        output
    );
    Ok(report)
}

/// Configuration file first, then command line overrides
fn load_config(matches: &ArgMatches) -> Result<BleachConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => BleachConfig::load(Path::new(path))?,
        None => BleachConfig::default(),
    };

    if let Some(depth) = matches.get_one::<usize>("max-depth") {
        config.max_depth = *depth;
    }
    if matches.get_flag("reject-unknown") {
        config.unrecognized = UnrecognizedPolicy::Reject;
    }
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        config.timeout_secs = Some(*secs);
    }

    config.validate()?;
    Ok(config)
}

fn build_cli() -> Command {
    Command::new("pdx-cdr")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Content disarm & reconstruction for office documents, PDFs, RTF and archives")
        .long_about(
            "Removes macros, scripts, embedded objects and external references from a document \
             and writes a structurally valid copy. Exits non-zero when the document could not \
             be sanitized.",
        )
        // Input/Output
        .arg(Arg::new("input")
            .short('i')
            .long("input")
            .value_name("FILE")
            .help("Input file, or - for stdin")
            .required(true))
        .arg(Arg::new("output")
            .short('o')
            .long("output")
            .value_name("FILE")
            .help("Output file, or - for stdout")
            .required(true))
        // Configuration
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("Configuration file (JSON/YAML)"))
        .arg(Arg::new("max-depth")
            .long("max-depth")
            .value_name("N")
            .value_parser(value_parser!(usize))
            .help("Maximum nesting depth of embedded documents"))
        .arg(Arg::new("reject-unknown")
            .long("reject-unknown")
            .action(ArgAction::SetTrue)
            .help("Fail on input no sanitizer recognizes instead of copying it"))
        .arg(Arg::new("timeout")
            .long("timeout")
            .value_name("SECS")
            .value_parser(value_parser!(u64))
            .help("Give up after this many seconds"))
        .arg(Arg::new("force")
            .long("force")
            .action(ArgAction::SetTrue)
            .help("Overwrite an existing output file"))
        // Reporting and logging
        .arg(Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print the report as JSON on stderr; disables logging"))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::Count)
            .help("More logging (-v info, -vv debug, -vvv trace)"))
}
