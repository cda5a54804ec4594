use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use bouncer::audit::{AuditEntry, Auditor, LogChannelAuditor};
use bouncer::config::{BouncerConfig, NotifierConfig};
use bouncer::events::EventBus;
use bouncer::notifier::{Notifier, SendGridNotifier, SmtpNotifier};
use bouncer::onboarding::{
    OnboardingDeps, OnboardingManager, OnboardingRouteState, SessionRegistry, onboarding_routes,
};
use bouncer::platform::discord::DiscordRest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BouncerConfig::from_env().context("Failed to load configuration")?;

    eprintln!("🚪 Bouncer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Guild: {}", config.guild_id);
    eprintln!("   Allowed domain: {}", config.onboarding.allowed_domain);
    eprintln!("   Events API: http://{}/api/events", config.listen_addr);
    match config.onboarding.step_timeout {
        Some(limit) => eprintln!("   Step timeout: {}s", limit.as_secs()),
        None => eprintln!("   Step timeout: none"),
    }

    // ── Platform ────────────────────────────────────────────────────────
    let discord = Arc::new(DiscordRest::new(config.discord_token.clone(), config.guild_id));

    let notifier: Arc<dyn Notifier> = match config.notifier.clone() {
        NotifierConfig::SendGrid(sendgrid) => {
            eprintln!("   Email: SendGrid template {}", sendgrid.template_id);
            Arc::new(SendGridNotifier::new(sendgrid))
        }
        NotifierConfig::Smtp(smtp) => {
            eprintln!("   Email: SMTP via {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpNotifier::new(smtp))
        }
    };

    let auditor: Arc<dyn Auditor> = Arc::new(LogChannelAuditor::new(
        discord.clone(),
        config.onboarding.layout.log_channel,
    ));

    // ── Onboarding ──────────────────────────────────────────────────────
    let deps = OnboardingDeps {
        provider: discord.clone(),
        messenger: discord.clone(),
        notifier,
        auditor: auditor.clone(),
        events: Arc::new(EventBus::default()),
        registry: Arc::new(SessionRegistry::new()),
        config: Arc::new(config.onboarding.clone()),
    };
    let manager = Arc::new(OnboardingManager::new(deps));
    let dispatch = tokio::spawn(manager.clone().run());

    auditor
        .record(AuditEntry::new(
            bouncer::audit::Severity::Info,
            format!(
                "{} has connected to guild {}!",
                config.onboarding.bot_user.mention(),
                config.guild_id
            ),
        ))
        .await;

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = onboarding_routes(OnboardingRouteState {
        manager: manager.clone(),
        events_secret: config.events_secret.clone(),
    });
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "Listening");

    let shutdown = {
        let manager = manager.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            manager.shutdown();
        }
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    if let Err(e) = dispatch.await {
        tracing::warn!(error = %e, "Dispatch task ended abnormally");
    }
    Ok(())
}
