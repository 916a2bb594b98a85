use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use proxy_provision::{
    input, plan, render, status, CertificateResolver, Firewall, Prompter, ProvisionError, RequestDraft, RunJournal,
    Settings, StatusReport, StepExecutor, SystemRunner,
};

/// Provision this host as an nginx TLS reverse proxy
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long)]
    domain: Option<String>,

    /// Upstream service address, e.g. http://127.0.0.1:3000
    #[arg(long)]
    upstream: Option<String>,

    /// Also serve the www. subdomain
    #[arg(long)]
    www: Option<bool>,

    #[arg(long)]
    install_vpn: Option<bool>,

    #[arg(long)]
    vpn_auth_key: Option<String>,

    /// full | http | https | none (or 1-4)
    #[arg(long)]
    firewall: Option<String>,

    /// existing | pasted | acme (or 1-3)
    #[arg(long = "cert")]
    cert_strategy: Option<String>,

    #[arg(long)]
    cert_path: Option<PathBuf>,

    #[arg(long)]
    key_path: Option<PathBuf>,

    /// Email for Let's Encrypt notices
    #[arg(long)]
    email: Option<String>,

    /// Reboot the host when done
    #[arg(long)]
    reboot: Option<bool>,

    /// Never prompt; missing values are an error
    #[arg(long)]
    non_interactive: bool,

    /// Print the plan and site configuration without changing anything
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn draft(&self) -> RequestDraft {
        RequestDraft {
            domain: self.domain.clone(),
            upstream: self.upstream.clone(),
            include_www: self.www,
            install_vpn: self.install_vpn,
            vpn_auth_key: self.vpn_auth_key.clone(),
            firewall: self.firewall.clone(),
            strategy: self.cert_strategy.clone(),
            cert_path: self.cert_path.clone(),
            key_path: self.key_path.clone(),
            email: self.email.clone(),
            reboot: self.reboot,
        }
    }
}

fn load_settings(path: Option<&str>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Ok(Settings::default()),
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::new()
        .parse_filters(level)
        .parse_default_env()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings.logging.level);
    if let Some(path) = &cli.config {
        log::info!("Loaded configuration from: {path}");
    }

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Provisioning aborted: {e}");
            eprintln!("Provisioning failed: {e}");
            eprintln!("The host may be partially provisioned; fix the problem and re-run.");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<(), ProvisionError> {
    let draft = RequestDraft::from_settings(&settings.request).overlay(cli.draft());
    let reboot = draft.reboot;

    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout()).interactive(!cli.non_interactive);
    let request = input::collect(draft, &mut prompter)?;

    let firewall = Firewall::new(settings.firewall.allow_ssh);
    let layout = &settings.paths;
    let mut runner = SystemRunner;

    if cli.dry_run {
        let material = CertificateResolver::new(layout).material_for(&request);
        println!("{}", render(&request, &material).text());
        return StepExecutor::new()
            .dry_run(true)
            .run(plan::build_steps(&request, layout, firewall), &mut runner);
    }

    let journal = settings
        .logging
        .journal_dir
        .as_deref()
        .and_then(|dir| match RunJournal::open(dir, request.domain()) {
            Ok(journal) => Some(journal),
            Err(e) => {
                log::warn!("Run journal disabled, cannot open {dir:?}: {e}");
                None
            }
        });
    let mut executor = StepExecutor::new().with_journal(journal);

    log::info!("Starting provisioning of {}", request.domain());
    plan::provision(&request, layout, firewall, &mut executor, &mut runner)?;

    let public_ip = match status::public_ip(&settings.status.public_ip_url).await {
        Ok(ip) => Some(ip),
        Err(e) => {
            log::warn!("Could not determine public IP: {e:#}");
            None
        }
    };
    println!("{}", StatusReport::new(&request, public_ip).summary());

    if prompter.confirm_reboot(reboot) {
        executor.run(vec![plan::reboot_step()], &mut runner)?;
    }
    Ok(())
}
