//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::api::ApiServer;
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands, SystemCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::kv::KvService;
use crate::data::queue::QueueService;
use crate::dispatcher::Dispatcher;
use crate::messages::MessageService;
use crate::prefill::{HttpDirectoryClient, PrefillController};
use crate::registry::SubscriptionRegistry;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub queue: Arc<QueueService>,
    pub kv: Arc<KvService>,
    pub registry: Arc<SubscriptionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub messages: Arc<MessageService>,
    pub prefill: Option<Arc<PrefillController>>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::System { command: system_cmd }) => {
                return Self::handle_system_command(system_cmd);
            }
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    /// Builds every service but doesn't bind a listener or spawn background
    /// loops. `pub` so integration tests can assemble a [`CoreApp`] without
    /// going through [`Self::run`]'s CLI parsing.
    pub async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let queue = Arc::new(QueueService::new(config.queue.backend, &config.queue.redis_url).await?);
        let kv = Arc::new(KvService::new(config.kv.backend, &config.kv.redis_url).await?);

        tracing::debug!(backend = queue.backend_name(), "Queue initialized");
        tracing::debug!(backend = kv.backend_name(), "KV store initialized");

        let registry = Arc::new(SubscriptionRegistry::new(kv.clone(), queue.clone()));
        let messages = Arc::new(MessageService::new(queue.clone(), registry.clone()));

        let rescan_interval = Duration::from_secs(config.kv.registry_rescan_interval_secs);
        let dispatcher = Arc::new(Dispatcher::new(queue.clone(), registry.clone(), rescan_interval).await?);

        let prefill = match &config.directory.url {
            Some(url) => {
                let directory = Arc::new(HttpDirectoryClient::new(
                    url,
                    Duration::from_secs(config.directory.timeout_secs),
                )?);
                Some(Arc::new(PrefillController::new(queue.clone(), registry.clone(), directory)))
            }
            None => {
                tracing::debug!("No directory collaborator configured, pre-fill controller disabled");
                None
            }
        };

        let shutdown = ShutdownService::new(queue.clone(), kv.clone());

        Ok(Self {
            config,
            shutdown,
            queue,
            kv,
            registry,
            dispatcher,
            messages,
            prefill,
        })
    }

    fn handle_system_command(cmd: SystemCommands) -> Result<()> {
        match cmd {
            SystemCommands::ShowConfig => {
                let (cli_config, _) = cli::parse();
                let config = AppConfig::load(&cli_config)?;
                println!("{config:#?}");
                Ok(())
            }
        }
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();
        app.start_background_tasks().await?;

        banner::print_banner(
            &app.config.server.host,
            app.config.server.port,
            &app.config.queue.backend.to_string(),
            &app.config.kv.backend.to_string(),
            !app.config.auth.admin_token.is_empty(),
        );

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) -> Result<()> {
        let dispatcher = self.dispatcher.clone();
        let rx = self.shutdown.subscribe();
        self.shutdown
            .register(tokio::spawn(async move { dispatcher.run_dispatch_loop(rx).await }))
            .await;

        let dispatcher = self.dispatcher.clone();
        let kv = self.kv.clone();
        let rx = self.shutdown.subscribe();
        self.shutdown
            .register(tokio::spawn(async move { dispatcher.run_watch_loop(kv, rx).await }))
            .await;

        let dispatcher = self.dispatcher.clone();
        let rx = self.shutdown.subscribe();
        self.shutdown
            .register(tokio::spawn(async move { dispatcher.run_rescan_loop(rx).await }))
            .await;

        if let Some(prefill) = &self.prefill {
            let prefill = prefill.clone();
            let rx = self.shutdown.subscribe();
            self.shutdown
                .register(tokio::spawn(async move { prefill.run_loop(rx).await }))
                .await;
        }

        tracing::debug!("Background tasks started");
        Ok(())
    }
}
