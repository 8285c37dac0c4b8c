use clap::Parser;
use grade_reminder::utils::error::{ErrorCategory, ReminderError};
use grade_reminder::utils::monitor::ProcessMonitor;
use grade_reminder::utils::{logger, validation::Validate};
use grade_reminder::{AppConfig, CliArgs, Command, HttpFetcher, Poller};

fn exit_code(e: &ReminderError) -> i32 {
    match e.category() {
        ErrorCategory::System => 3,
        _ => 1,
    }
}

fn fail(stage: &str, e: ReminderError) -> ! {
    tracing::error!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(&e));
}

fn load_config(args: &CliArgs) -> Result<AppConfig, ReminderError> {
    let config = if args.from_env {
        tracing::info!("Loading configuration from environment variables");
        AppConfig::from_env()?
    } else {
        tracing::info!("Loading configuration from {}", args.config.display());
        AppConfig::from_file(&args.config)?
    };
    config.validate()?;
    Ok(config)
}

fn init(args: &CliArgs, force: bool) -> Result<(), ReminderError> {
    if args.config.exists() && !force {
        return Err(ReminderError::config(format!(
            "{} already exists, use --force to overwrite",
            args.config.display()
        )));
    }
    std::fs::write(&args.config, grade_reminder::config::SAMPLE_CONFIG)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // 初始化日誌
    logger::init_logger(args.verbose, args.json_logs);

    tracing::info!("Starting grade-reminder");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    if let Command::Init { force } = args.command() {
        if let Err(e) = init(&args, force) {
            fail("Init failed", e);
        }
        println!("✅ Sample configuration written to {}", args.config.display());
        return;
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => fail("Configuration validation failed", e),
    };

    if args.command() == Command::Validate {
        println!(
            "✅ Configuration is valid: {} subject(s), channels: [{}]",
            config.subjects.len(),
            config
                .dispatcher()
                .map(|d| d.channel_names().join(", "))
                .unwrap_or_default()
        );
        return;
    }

    let fetcher = match HttpFetcher::new(&config.http_settings()) {
        Ok(fetcher) => fetcher,
        Err(e) => fail("Failed to build HTTP client", e),
    };
    let dispatcher = match config.dispatcher() {
        Ok(dispatcher) => dispatcher,
        Err(e) => fail("Failed to build notification channels", e),
    };
    let subjects = match config.subjects() {
        Ok(subjects) => subjects,
        Err(e) => fail("Invalid subjects", e),
    };

    if dispatcher.is_empty() {
        tracing::warn!("📪 No notification channels configured; changes will only be printed");
    } else {
        tracing::info!("📨 Channels: {}", dispatcher.channel_names().join(", "));
    }

    let monitor_enabled = args.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let mut poller = Poller::new(
        config.poller_settings(),
        subjects,
        fetcher,
        dispatcher,
        config.debug_storage(),
    )
    .with_monitor(ProcessMonitor::new(monitor_enabled));

    tracing::info!(
        "👀 Watching {} subject(s), round delay {:?}",
        poller.subjects().len(),
        config.round_delay()
    );

    match args.command() {
        Command::Check => {
            let summary = poller.run_round().await;
            tracing::info!(
                "✅ Check finished: {} subject(s), {} failed",
                summary.outcomes.len(),
                summary.failures()
            );
        }
        _ => {
            tokio::select! {
                _ = poller.run_forever() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("👋 Received Ctrl-C, shutting down");
                }
            }
        }
    }
}
