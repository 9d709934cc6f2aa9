// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! typescan-dump - Dump DDS/ROS 2 type definitions and topic bindings.
//!
//! Reads type names from live DDS discovery and/or input files and emits
//! one delimited JSON record per asserted type and per topic binding.
//!
//! Usage:
//!   typescan-dump -i types.txt
//!   echo std_msgs/msg/String | typescan-dump -i -
//!   typescan-dump -d 0 -o types.json -O

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::{error, info};
use typescan::cache::{CacheOptions, RequestReplyMapping};
use typescan::input::{
    DiscoveryInput, DiscoverySource, FileInput, FileInputOptions, InputEmitter,
};
use typescan::monitor::{MonitorOptions, TypeMonitor};
use typescan::output::{JsonOutput, OutputOptions};

/// Dump DDS/ROS 2 type definitions and topic bindings
#[derive(Parser, Debug)]
#[command(name = "typescan-dump")]
#[command(version)]
#[command(about = "Dump DDS/ROS 2 type definitions from discovery or files")]
struct Args {
    /// Join DOMAIN[/QOS-PROFILE] and detect types from DDS discovery.
    /// Repeat to join multiple domains.
    #[arg(short = 'd', long = "domain", value_name = "DOMAIN[/QOS]", action = ArgAction::Append)]
    domains: Vec<String>,

    /// Read type names from FILE (`-` for standard input). Repeat to read
    /// from multiple files.
    #[arg(short = 'i', long = "input", value_name = "FILE", action = ArgAction::Append)]
    inputs: Vec<String>,

    /// Write records to FILE instead of standard out
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Append to the output file instead of truncating it
    #[arg(short = 'a', long = "append")]
    append: bool,

    /// Overwrite the output file if it already exists
    #[arg(short = 'O', long = "overwrite")]
    overwrite: bool,

    /// Only consider types whose ROS name matches REGEX
    #[arg(short = 'f', long = "filter", value_name = "REGEX", default_value = ".*")]
    filter: String,

    /// Only consider types whose on-wire name matches REGEX
    #[arg(short = 'F', long = "raw-filter", value_name = "REGEX", default_value = ".*")]
    raw_filter: String,

    /// Output ROS types under their mangled name
    /// (e.g. "my_types::msg::dds_::MyType_")
    #[arg(short = 'm', long = "mangle")]
    mangle: bool,

    /// Produce more logging output. Repeat to increase.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Generate types compatible with the given RMW implementation
    #[arg(long = "compatibility-mode", value_name = "RMW")]
    compatibility_mode: Option<CompatibilityMode>,

    /// How request/reply types are correlated
    #[arg(long = "request-reply-mapping", value_name = "MAPPING", default_value = "extended")]
    request_reply_mapping: MappingArg,

    /// Swap output streams: records to stderr, diagnostics to stdout
    #[arg(short = 'W', long = "swap-outputs")]
    swap_outputs: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CompatibilityMode {
    /// Append `_` to every member name (requires the extended mapping).
    #[value(name = "rmw_connext_cpp")]
    RmwConnextCpp,
    /// Add the CycloneDDS inline request/reply header (requires the basic
    /// mapping).
    #[value(name = "rmw_cyclonedds_cpp")]
    RmwCycloneddsCpp,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MappingArg {
    Basic,
    Extended,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DomainConfig {
    domain_id: u32,
    qos_profile: Option<String>,
}

fn parse_domain(arg: &str) -> anyhow::Result<DomainConfig> {
    let (id, qos_profile) = match arg.split_once('/') {
        Some((id, qos)) => {
            if qos.is_empty() {
                bail!("empty QoS profile name");
            }
            (id, Some(qos.to_string()))
        }
        None => (arg, None),
    };
    let domain_id = id
        .parse::<u32>()
        .with_context(|| format!("failed to parse domain ID: {id}"))?;
    Ok(DomainConfig {
        domain_id,
        qos_profile,
    })
}

/// Resolve `-d` flags to live discovery sources.
///
/// Domain monitoring needs a DDS middleware linked into the build; sources
/// implement `typescan::input::DiscoverySource` and attach to the
/// middleware's built-in subscription and publication readers.
fn discovery_sources(
    domains: &[DomainConfig],
) -> anyhow::Result<Vec<Box<dyn DiscoverySource>>> {
    if domains.is_empty() {
        return Ok(Vec::new());
    }
    bail!(
        "no DDS discovery backend is linked into this build; \
         domain monitoring is unavailable (read type names with --input instead)"
    );
}

fn init_logging(verbose: u8, swap_outputs: bool) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    // Diagnostics stay off the record stream.
    if swap_outputs {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stdout)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

type ShutdownSignal = Arc<(Mutex<bool>, Condvar)>;

fn signal_shutdown(signal: &ShutdownSignal) {
    let (flag, condvar) = &**signal;
    *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
    condvar.notify_all();
}

fn wait_for_shutdown(signal: &ShutdownSignal) {
    let (flag, condvar) = &**signal;
    let mut guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
    while !*guard {
        guard = condvar
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Help and version are not argument errors.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_logging(args.verbose, args.swap_outputs);

    match run(args) {
        Ok(()) => {}
        Err(RunError::Arguments(err)) => {
            eprintln!("{}: {err:#}", "invalid arguments".red().bold());
            std::process::exit(1);
        }
        Err(RunError::Fatal(err)) => {
            eprintln!("{}: {err:#}", "Error".red().bold());
            std::process::exit(-1);
        }
    }
}

enum RunError {
    Arguments(anyhow::Error),
    Fatal(anyhow::Error),
}

fn run(args: Args) -> Result<(), RunError> {
    let mut domains = args
        .domains
        .iter()
        .map(|arg| parse_domain(arg))
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(RunError::Arguments)?;
    domains.sort();
    domains.dedup();

    let mut input_files = args.inputs.clone();
    input_files.sort();
    input_files.dedup();

    let sources = discovery_sources(&domains).map_err(RunError::Arguments)?;
    for domain in &domains {
        info!(
            domain = domain.domain_id,
            qos = domain.qos_profile.as_deref().unwrap_or("default"),
            "monitoring domain"
        );
    }

    let cache_options = CacheOptions {
        demangle_ros_names: !args.mangle,
        cyclone_compatible: matches!(
            args.compatibility_mode,
            Some(CompatibilityMode::RmwCycloneddsCpp)
        ),
        legacy_rmw_compatible: matches!(
            args.compatibility_mode,
            Some(CompatibilityMode::RmwConnextCpp)
        ),
        request_reply_mapping: match args.request_reply_mapping {
            MappingArg::Basic => RequestReplyMapping::Basic,
            MappingArg::Extended => RequestReplyMapping::Extended,
        },
    };
    let monitor_options = MonitorOptions {
        include_non_ros: true,
        type_filter: args.filter.clone(),
        raw_type_filter: args.raw_filter.clone(),
        cache: cache_options,
    };

    let file_options = FileInputOptions { input_files };
    let input: Box<dyn InputEmitter> = if sources.is_empty() {
        Box::new(FileInput::new(file_options))
    } else {
        Box::new(DiscoveryInput::new(file_options, sources))
    };
    let output = Box::new(JsonOutput::new(OutputOptions {
        output_file: args.output.clone(),
        append: args.append,
        overwrite: args.overwrite,
        swap_outputs: args.swap_outputs,
    }));

    let monitor = Arc::new(
        TypeMonitor::new(input, output, monitor_options)
            .map_err(|err| RunError::Arguments(err.into()))?,
    );
    monitor
        .start()
        .map_err(|err| RunError::Fatal(err.into()))?;

    let shutdown: ShutdownSignal = Arc::new((Mutex::new(false), Condvar::new()));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || signal_shutdown(&shutdown))
            .map_err(|err| RunError::Fatal(err.into()))?;
    }

    let consumer = {
        let monitor = Arc::clone(&monitor);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            let result = monitor.consume_input();
            if let Err(err) = &result {
                error!(%err, "an error occurred");
            }
            signal_shutdown(&shutdown);
            result
        })
    };

    // Wake on signal or on consumer completion, then shut down in order.
    wait_for_shutdown(&shutdown);
    monitor.stop();

    match consumer.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(RunError::Fatal(err.into())),
        Err(_) => Err(RunError::Fatal(anyhow::anyhow!(
            "input consumer thread panicked"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_domain_with_qos() {
        let config = parse_domain("42/low_latency").unwrap();
        assert_eq!(config.domain_id, 42);
        assert_eq!(config.qos_profile.as_deref(), Some("low_latency"));

        let config = parse_domain("0").unwrap();
        assert_eq!(config.domain_id, 0);
        assert!(config.qos_profile.is_none());
    }

    #[test]
    fn rejects_malformed_domains() {
        assert!(parse_domain("abc").is_err());
        assert!(parse_domain("1/").is_err());
    }

    #[test]
    fn args_accept_repeated_inputs() {
        let args =
            Args::try_parse_from(["typescan-dump", "-i", "a.txt", "-i", "-", "-f", "std_msgs/.*"])
                .unwrap();
        assert_eq!(args.inputs, vec!["a.txt", "-"]);
        assert_eq!(args.filter, "std_msgs/.*");
    }

    #[test]
    fn compatibility_modes_parse_by_rmw_name() {
        let args = Args::try_parse_from([
            "typescan-dump",
            "--compatibility-mode",
            "rmw_cyclonedds_cpp",
            "--request-reply-mapping",
            "basic",
        ])
        .unwrap();
        assert!(matches!(
            args.compatibility_mode,
            Some(CompatibilityMode::RmwCycloneddsCpp)
        ));
        assert!(matches!(args.request_reply_mapping, MappingArg::Basic));
    }
}
