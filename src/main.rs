use std::path::Path;

use colored::Colorize;
use tickroute::session::{SessionStats, SubscriberSession};
use tickroute::{
    AppResult,
    cli::{Cli, Commands},
    config::Config,
    init_logging,
};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    match cli.command() {
        Commands::Run {
            servers,
            service,
            topics,
            fields,
            auth,
            max_ticks,
        } => {
            let mut config = Config::load_or_default(&cli.config_file);
            if !servers.is_empty() {
                config.servers = servers;
            }
            if let Some(service) = service {
                config.subscription.service = service;
            }
            if !topics.is_empty() {
                config.subscription.topics = topics;
            }
            if !fields.is_empty() {
                config.subscription.fields = fields;
            }
            if let Some(auth) = auth {
                config.auth.mode = auth;
            }
            if let Some(max_ticks) = max_ticks {
                config.subscription.max_ticks = max_ticks;
            }
            config.validate()?;

            // The guard must outlive the session for file logs to flush.
            let _guard = init_logging(
                &cli.effective_log_level(),
                Some(Path::new(&config.log.file_path)),
            )?;

            tracing::info!("TickRoute session client starting...");
            tracing::debug!("CLI arguments: {:?}", cli);
            tracing::info!(
                servers = ?config.servers,
                service = %config.subscription.service,
                "session endpoints (simulated)"
            );

            let mut session = SubscriberSession::new(config.subscriber_config()?);
            session.initialize()?;

            let shutdown = session.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("ctrl-c received");
                    let _ = shutdown.send(()).await;
                }
            });

            let stats = session.run().await;
            print_summary(&stats);
        }
        Commands::Config { action } => {
            init_logging(&cli.effective_log_level(), None)?;
            Config::handle_command(&action, &cli.config_file)?;
        }
    }

    Ok(())
}

fn print_summary(stats: &SessionStats) {
    println!();
    println!("{}", "session summary".bold());
    println!("  events   {}", stats.events.to_string().cyan());
    println!("  ticks    {}", stats.ticks.to_string().green());
    println!("  timeouts {}", stats.timeouts.to_string().yellow());
    let raised = stats.raised.to_string();
    println!(
        "  raised   {}",
        if stats.raised == 0 { raised.green() } else { raised.red() }
    );
}
