use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use anyhow::Context;
use nessie_export::{
    config::AppConfig,
    output::{resolve_output_path, write_artifact},
    run_export_workflow, Credentials, ExportError, ExportFormat, NessusClient, ScanService,
};

fn build_cli() -> Command {
    Command::new("nessie-export")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Launch a Nessus scan, wait until it finishes and export its results")
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .value_name("URL")
                .env("NESSUS_API_URL")
                .help("Base URL of the Nessus API (e.g. https://nessus:8834)"),
        )
        .arg(
            Arg::new("username")
                .short('u')
                .long("username")
                .value_name("USER")
                .env("NESSUS_USERNAME")
                .required(true)
                .help("Username to log in with"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .value_name("PASSWORD")
                .env("NESSUS_PASSWORD")
                .hide_env_values(true)
                .conflicts_with("password-file")
                .help("Password for the user; prefer --password-file or the environment so it stays out of shell history"),
        )
        .arg(
            Arg::new("password-file")
                .long("password-file")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Read the password from the first line of FILE"),
        )
        .arg(
            Arg::new("fingerprints")
                .long("fingerprints")
                .value_name("SHA256")
                .value_delimiter(',')
                .help("Comma separated base64 SHA-256 SPKI fingerprints of the Nessus server"),
        )
        .arg(
            Arg::new("insecure")
                .long("insecure")
                .help("Accept any server certificate")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ca-cert")
                .long("ca-cert")
                .value_name("PEM")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Additional root certificate to trust"),
        )
        .arg(
            Arg::new("scan-id")
                .short('s')
                .long("scan-id")
                .value_name("ID")
                .value_parser(clap::value_parser!(i64))
                .help("Scan to launch"),
        )
        .arg(
            Arg::new("template-id")
                .short('t')
                .long("template-id")
                .value_name("ID")
                .value_parser(clap::value_parser!(i64))
                .help("Report template for the export"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .value_parser(["nessus", "csv", "html", "pdf", "db"])
                .help("Export format [default: csv]"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help("Seconds between status checks [default: 5]"),
        )
        .arg(
            Arg::new("max-wait")
                .long("max-wait")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help("Give up a wait (scan or export) after this many seconds"),
        )
        .arg(
            Arg::new("request-timeout")
                .long("request-timeout")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help("Timeout for each HTTP request [default: 30]"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("File or directory to write the report to [default: ./report.<format>]"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Configuration file [default: ~/.nessie-export.toml]"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity")
                .action(ArgAction::Count),
        )
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();
}

/// File values first, command line flags on top
fn load_config(matches: &ArgMatches) -> anyhow::Result<AppConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => AppConfig::from_toml_file(path)?,
        None => AppConfig::load_default_config()?,
    };

    if let Some(url) = matches.get_one::<String>("api-url") {
        config.service.api_url = url.clone();
    }
    if let Some(fingerprints) = matches.get_many::<String>("fingerprints") {
        config.service.fingerprints = fingerprints.cloned().collect();
    }
    if matches.get_flag("insecure") {
        config.service.insecure = true;
    }
    if let Some(path) = matches.get_one::<PathBuf>("ca-cert") {
        config.service.ca_cert = Some(path.clone());
    }
    if let Some(seconds) = matches.get_one::<u64>("request-timeout") {
        config.service.request_timeout = *seconds;
    }
    if let Some(id) = matches.get_one::<i64>("scan-id") {
        config.workflow.scan_id = Some(*id);
    }
    if let Some(id) = matches.get_one::<i64>("template-id") {
        config.workflow.template_id = Some(*id);
    }
    if let Some(format) = matches.get_one::<String>("format") {
        config.workflow.format = format.parse::<ExportFormat>()?;
    }
    if let Some(seconds) = matches.get_one::<u64>("interval") {
        config.workflow.poll_interval = *seconds;
    }
    if let Some(seconds) = matches.get_one::<u64>("max-wait") {
        config.workflow.max_wait = Some(*seconds);
    }
    if let Some(path) = matches.get_one::<PathBuf>("output") {
        config.workflow.output = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

fn read_password_file(path: &Path) -> anyhow::Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read password file {}", path.display()))?;
    let password = content.lines().next().unwrap_or("").to_string();
    if password.is_empty() {
        anyhow::bail!("Password file {} is empty", path.display());
    }
    Ok(password)
}

fn credentials(matches: &ArgMatches) -> anyhow::Result<Credentials> {
    let username = matches
        .get_one::<String>("username")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No username given"))?;

    let password = match (
        matches.get_one::<String>("password"),
        matches.get_one::<PathBuf>("password-file"),
    ) {
        (Some(password), _) => password.clone(),
        (None, Some(path)) => read_password_file(path)?,
        (None, None) => anyhow::bail!("No password given; use --password-file or NESSUS_PASSWORD"),
    };

    Ok(Credentials::new(username, password))
}

/// First interrupt cancels the workflow and lets logout run; a second one calls `force_exit`
async fn watch_interrupts<S, Fut, F>(mut next_interrupt: S, cancel: CancellationToken, force_exit: F)
where
    S: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
    F: FnOnce(),
{
    if next_interrupt().await.is_err() {
        return;
    }
    log::warn!("Interrupted, stopping after logout (ctrl-c again to quit immediately)");
    cancel.cancel();

    if next_interrupt().await.is_ok() {
        log::warn!("Interrupted again, exiting without waiting for logout");
        force_exit();
    }
}

fn install_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(watch_interrupts(tokio::signal::ctrl_c, cancel, || {
        process::exit(ExportError::Cancelled.exit_code());
    }));
}

async fn run(matches: &ArgMatches) -> anyhow::Result<PathBuf> {
    let config = load_config(matches)?;
    let credentials = credentials(matches)?;
    let job = config.workflow.job()?;

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());
    let poller = config.workflow.poller(cancel);

    let client = NessusClient::new(&config.service)?;
    println!(
        "{} {} {}",
        "[~] Exporting scan".bright_blue(),
        job.scan_id.to_string().bright_cyan().bold(),
        format!("as {} from {}", job.format, client.base_url()).bright_blue()
    );
    let service: Arc<dyn ScanService> = Arc::new(client);

    let artifact = run_export_workflow(service, &credentials, &job, &poller).await?;

    let path = resolve_output_path(config.workflow.output.as_deref(), &artifact);
    let written = write_artifact(&path, &artifact)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    println!(
        "{} {} {}",
        "[✓] Report written to".bright_green(),
        written.display().to_string().bright_cyan().bold(),
        format!("({} bytes)", artifact.len()).bright_green()
    );
    Ok(written)
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_count("verbose"));

    if let Err(e) = run(&matches).await {
        eprintln!("{} {:#}", "[!] ERROR:".bright_red(), e);
        let code = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<ExportError>())
            .map(ExportError::exit_code)
            .unwrap_or(1);
        process::exit(code);
    }
}
