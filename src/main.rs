use anyhow::{anyhow, Context};
use clap::Parser;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use std::path::PathBuf;
use std::sync::Arc;

use s3inbox::auth::build_authenticator;
use s3inbox::backend::S3MetadataClient;
use s3inbox::config::Config;
use s3inbox::messenger::AmqpPublisher;
use s3inbox::proxy::InboxProxy;

/// s3inbox - upload-only S3 inbox proxy built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "s3inbox")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging subsystem
    s3inbox::logging::init_subscriber()
        .map_err(|e| anyhow!("Failed to initialize logging subsystem: {}", e))?;

    // Parse command-line arguments
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        backend = ?config.backend,
        broker = ?config.broker,
        auth_enabled = config.auth.enabled,
        "Configuration loaded successfully"
    );

    if args.test {
        tracing::info!("Configuration test passed");
        return Ok(());
    }

    let authenticator = build_authenticator(&config.auth)?;

    // In the foreground the broker is connected before any listener opens, so
    // a missing broker fails startup. Daemon mode forks inside run_forever and
    // the broker threads would not survive it: connect on first publish then.
    let (publisher, runtime) = if args.daemon {
        tracing::info!(
            broker = %config.broker.redacted_uri(),
            "Daemon mode: broker connection opens on first publish"
        );
        (AmqpPublisher::new(&config.broker), None)
    } else {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
        let publisher = runtime
            .block_on(AmqpPublisher::connect(&config.broker))
            .context("Failed to connect to message broker")?;
        (publisher, Some(runtime))
    };

    let backend = Arc::new(config.backend.clone());
    let metadata = S3MetadataClient::new(&backend)?;
    let proxy = InboxProxy::new(
        backend,
        authenticator,
        Arc::new(metadata),
        Arc::new(publisher),
    )?;

    // Build Pingora server options
    let opt = Opt {
        daemon: args.daemon,
        upgrade: args.upgrade,
        ..Default::default()
    };

    let mut server =
        Server::new(Some(opt)).map_err(|e| anyhow!("Failed to create Pingora server: {}", e))?;
    server.bootstrap();

    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);
    proxy_service.threads = Some(config.server.threads);

    let listen_addr = config.server.listen_addr();
    match &config.server.tls {
        Some(tls) => {
            proxy_service
                .add_tls(&listen_addr, &tls.cert_path, &tls.key_path)
                .map_err(|e| anyhow!("Failed to configure TLS listener: {}", e))?;
        }
        None => proxy_service.add_tcp(&listen_addr),
    }

    tracing::info!(
        address = %listen_addr,
        tls = config.server.tls.is_some(),
        threads = config.server.threads,
        "Starting s3inbox"
    );

    server.add_service(proxy_service);

    // Keep the runtime that opened the broker connection alive for the
    // lifetime of the process.
    let _runtime = runtime;
    server.run_forever();
}
