use actix_server::ServerHandle;
use actix_web::{App, HttpServer, web::Data};
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use std::{
    io::Write,
    time::{Duration, Instant},
};
use tape_monitor::{
    api::Api,
    backup_service_client::BackupServiceClient,
    config::{AppConfig, ConfigStore, IniConfigStore},
    config_server::{DeviceAction, LocalConfigServer},
    console_surface::ConsoleSurface,
    network_link::{NmcliLink, NmcliScanner},
    orchestrator::Orchestrator,
};
use tokio::{
    signal::unix::{Signal, SignalKind, signal},
    time::MissedTickBehavior,
};

const BOOT_SCREEN_DURATION: Duration = Duration::from_millis(1500);

type DeviceConfigServer = LocalConfigServer<IniConfigStore, NmcliScanner, BackupServiceClient>;
type DeviceLoop<'a> =
    Orchestrator<&'a mut ConsoleSurface, NmcliLink, BackupServiceClient, DeviceConfigServer>;

enum ShutdownReason {
    Restart,
    Shutdown,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Restart => write!(f, "restarting device loop"),
            ShutdownReason::Shutdown => write!(f, "shutting down"),
        }
    }
}

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::load().context("failed to load configuration")?;

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    // the touch reader owns stdin, so the surface outlives restarts
    let mut surface = ConsoleSurface::with_stdin_touches();

    while let ShutdownReason::Restart =
        run_until_shutdown(&config, &mut surface, &mut sigterm).await?
    {}

    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

async fn run_until_shutdown(
    config: &AppConfig,
    surface: &mut ConsoleSurface,
    sigterm: &mut Signal,
) -> Result<ShutdownReason> {
    info!("starting device loop");

    let store = IniConfigStore::new(&config.paths.settings_file);
    let settings = store.load().context("failed to load settings")?;

    let service = BackupServiceClient::new(&settings, config.timing.request_timeout)
        .context("failed to create backup service client")?;

    let (config_server, handle) = LocalConfigServer::new(
        store,
        NmcliScanner::new(&config.network.interface),
        service.clone(),
    );

    let (server_handle, server_task) = run_server(Api::new(handle), config.ui.port)?;

    let mut device: DeviceLoop = Orchestrator::new(
        settings,
        surface,
        NmcliLink::new(&config.network.interface),
        service,
        config_server,
    );

    device.show_boot();
    tokio::time::sleep(BOOT_SCREEN_DURATION).await;
    device.start(Instant::now());

    let reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            debug!("ctrl-c received");
            ShutdownReason::Shutdown
        },
        _ = sigterm.recv() => {
            debug!("SIGTERM received");
            ShutdownReason::Shutdown
        },
        action = run_loop(&mut device, config.timing.loop_period) => {
            match action {
                DeviceAction::Restart => debug!("device restart requested"),
            }
            ShutdownReason::Restart
        },
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
            ShutdownReason::Shutdown
        },
    };

    info!("{reason}");

    server_handle.stop(true).await;

    if matches!(reason, ShutdownReason::Shutdown) {
        info!("shutdown complete");
    }

    Ok(reason)
}

async fn run_loop(device: &mut DeviceLoop<'_>, period: Duration) -> DeviceAction {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if let Some(action) = device.tick(Instant::now()).await {
            return action;
        }
    }
}

fn run_server(
    api: Api,
    port: u16,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    // handlers only forward to the device loop, one worker is enough
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(api.clone()))
            .configure(Api::routes)
    })
    .workers(1)
    .bind(("0.0.0.0", port))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    info!("configuration server listening on port {port}");

    Ok((server.handle(), tokio::spawn(server)))
}
