use color_eyre::{eyre::eyre, Result};
use padhub::config::{default_config_path, InputSettings};
use padhub::controller::backend::GilrsBackend;
use padhub::controller::{ConnectedDevice, HotplugNotification, InputBackend, InputStartup};
use padhub::logging::{self, LogLevelHandle};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = setup()?;
    let settings = setup_config().await?;
    log_level.apply(&settings.log_level)?;

    let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();

    info!("Initializing input subsystem");
    let subsystem = InputStartup::create(settings)?
        .load_mappings()?
        .initialize::<GilrsBackend>(notification_tx)?;
    let registry = subsystem.registry();
    let poll_handle = subsystem.spawn();

    // One listener task per occupied slot
    let mut listeners: HashMap<usize, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            notification = notification_rx.recv() => match notification {
                Some(HotplugNotification::DeviceConnected(connected)) => {
                    let slot_index = connected.info.slot_index;
                    listeners.insert(slot_index, spawn_listener(connected));
                    info!("{} controller(s) connected", registry.connected()?.len());
                }
                Some(HotplugNotification::DeviceRemoved { slot_index }) => {
                    info!("Controller in slot {} removed", slot_index);
                    // The listener ends on its own once the device's sink is gone
                    listeners.remove(&slot_index);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let backend = poll_handle
        .stop()
        .await
        .map_err(|e| eyre!("Poll loop terminated with error: {}", e))?;
    backend.shutdown();

    Ok(())
}

fn spawn_listener(connected: ConnectedDevice) -> JoinHandle<()> {
    let ConnectedDevice { info, mut events } = connected;
    info!(
        "Listening to '{}' in slot {} (instance {})",
        info.name, info.slot_index, info.instance_id
    );

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(
                "[slot {}] {:?} {} at {}",
                event.owner.slot_index,
                event.kind,
                if event.pressed { "pressed" } else { "released" },
                event.timestamp.format("%H:%M:%S.%3f")
            );
        }
        debug!("Event stream of '{}' closed", info.name);
    })
}

fn setup() -> Result<LogLevelHandle> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    color_eyre::install()?;
    Ok(logging::init()?)
}

async fn setup_config() -> Result<InputSettings> {
    let path = default_config_path();
    InputSettings::ensure_default_config(&path).await?;
    let settings = InputSettings::load(&path).await?;
    Ok(settings)
}
