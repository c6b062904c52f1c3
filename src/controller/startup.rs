//! Startup - typed initialization sequence of the input subsystem
//!
//! ```text
//! InputStartup<Configured> ──load_mappings──► InputStartup<MappingsLoaded> ──initialize──► InputSubsystem
//! ```
//!
//! There is no degraded mode. If the mapping database cannot be loaded or the
//! backend refuses to come up, startup fails and the caller is expected to
//! abort.

use statum::{machine, state};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::{ConfigError, InputSettings};
use crate::controller::backend::{BackendError, InputBackend};
use crate::controller::poll_loop::{HotplugNotification, PollLoop, PollLoopHandle};
use crate::controller::registry::DeviceRegistry;
use crate::mapping_db::{MappingDatabase, MappingDbError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid input settings: {0}")]
    Config(#[from] ConfigError),

    #[error("Unable to load controller database: {0}")]
    Mappings(#[from] MappingDbError),

    #[error("Unable to initialize input subsystem: {0}")]
    Backend(#[from] BackendError),

    #[error("Mapping database missing from startup state")]
    MissingMappings,
}

#[state]
#[derive(Debug, Clone)]
pub enum StartupState {
    Configured,
    MappingsLoaded(MappingDatabase),
}

#[machine]
#[derive(Debug)]
pub struct InputStartup<S: StartupState> {
    settings: InputSettings,
}

impl InputStartup<Configured> {
    pub fn create(settings: InputSettings) -> Result<Self, StartupError> {
        settings.validate()?;
        Ok(Self::new(settings))
    }

    pub fn load_mappings(self) -> Result<InputStartup<MappingsLoaded>, StartupError> {
        let mappings = MappingDatabase::load_or_bundled(self.settings.mapping_db_path.as_deref())
            .map_err(|e| {
                error!("Fatal: Unable to load controller database: {}", e);
                e
            })?;

        info!(
            "Controller database ready: {} mappings from {}",
            mappings.len(),
            mappings.source()
        );
        Ok(self.transition_with(mappings))
    }
}

impl InputStartup<MappingsLoaded> {
    pub fn mappings(&self) -> Option<&MappingDatabase> {
        self.get_state_data()
    }

    /// Initializes backend `B` with the loaded mappings and wires up the
    /// registry and poll loop. Nothing polls until [`InputSubsystem::spawn`].
    pub fn initialize<B: InputBackend>(
        self,
        notifier: mpsc::UnboundedSender<HotplugNotification>,
    ) -> Result<InputSubsystem<B>, StartupError> {
        let mappings = self
            .get_state_data()
            .ok_or(StartupError::MissingMappings)?;

        let backend = B::initialize(mappings).map_err(|e| {
            error!("Fatal: Unable to initialize input subsystem: {}", e);
            e
        })?;

        let registry = Arc::new(DeviceRegistry::new(self.settings.device_defaults()));
        let poll_loop = PollLoop::new(backend, Arc::clone(&registry), notifier, &self.settings);

        info!("Input subsystem initialized");
        Ok(InputSubsystem {
            registry,
            poll_loop,
        })
    }
}

/// Initialized input subsystem, ready to start polling.
pub struct InputSubsystem<B: InputBackend> {
    registry: Arc<DeviceRegistry>,
    poll_loop: PollLoop<B>,
}

impl<B: InputBackend> InputSubsystem<B> {
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Starts the recurring tick on the tokio runtime.
    pub fn spawn(self) -> PollLoopHandle<B> {
        PollLoopHandle::spawn(self.poll_loop)
    }
}
