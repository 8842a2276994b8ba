//! Vita - Mentorship matching and session booking

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vita::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{
            SqlxBookingRepository, SqlxMentorRepository, SqlxNotificationRepository,
            SqlxSessionRepository, SqlxUserRepository,
        },
    },
    services::{
        booking::{BookingService, BookingSettings, MentorLocks},
        email::{LogMailer, Mailer, SmtpMailer},
        meeting::MeetingLinkGenerator,
        mentor::MentorService,
        messaging::{DisabledMessenger, Messenger, WhatsAppMessenger},
        notification::NotificationService,
        user::UserService,
    },
};

/// How often idle mentor locks and expired sessions are swept
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vita=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vita...");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)?;
    tracing::info!("Configuration loaded from {}", config_path.display());

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let mentor_repo = SqlxMentorRepository::boxed(pool.clone());
    let booking_repo = SqlxBookingRepository::boxed(pool.clone());
    let notification_repo = SqlxNotificationRepository::boxed(pool.clone());

    // Outbound channels
    let mailer: Arc<dyn Mailer> = if config.mail.enabled {
        tracing::info!(host = %config.mail.host, port = config.mail.port, "SMTP mail enabled");
        Arc::new(SmtpMailer::new(&config.mail, config.mail_from_name())?)
    } else {
        tracing::info!("Mail disabled, outgoing mail is logged only");
        Arc::new(LogMailer)
    };
    let messenger: Arc<dyn Messenger> = if config.messaging.enabled {
        tracing::info!("Chat messaging enabled");
        Arc::new(WhatsAppMessenger::new(&config.messaging)?)
    } else {
        Arc::new(DisabledMessenger)
    };

    // Initialize services
    let user_service = Arc::new(UserService::with_session_expiration(
        user_repo.clone(),
        session_repo,
        mentor_repo.clone(),
        config.auth.session_expiration_days,
    ));
    let mentor_service = Arc::new(MentorService::new(mentor_repo.clone()));
    let notification_service = Arc::new(NotificationService::new(notification_repo));
    let locks = Arc::new(MentorLocks::new());
    let booking_service = Arc::new(
        BookingService::new(
            booking_repo,
            user_repo,
            mentor_repo,
            notification_service.clone(),
            BookingSettings::from_config(&config),
        )?
        .with_mailer(mailer)
        .with_messenger(messenger)
        .with_meeting_links(MeetingLinkGenerator::new(&config.meeting.base_url))
        .with_locks(locks.clone()),
    );

    // Periodic cleanup of idle mentor locks and expired sessions
    {
        let locks = locks.clone();
        let user_service = user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let pruned = locks.cleanup();
                if pruned > 0 {
                    tracing::debug!(pruned, "Pruned idle mentor locks");
                }
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Removed expired sessions"),
                    Err(e) => tracing::error!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    let state = AppState {
        user_service,
        mentor_service,
        booking_service,
        notification_service,
        session_days: config.auth.session_expiration_days,
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
