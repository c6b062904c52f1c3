//! Poll Loop - timed drain of hardware notifications
//!
//! On every tick the loop takes the registry lock once, pulls every pending
//! notification out of the backend in arrival order and dispatches it:
//!
//! ```text
//! backend ──► drain (one lock) ──► registry attach/detach ──► HotplugNotification
//!                              └─► resolve ──► translate ──► device sink
//! ```
//!
//! A drain runs to completion once started. Ticks are assumed to be short
//! compared to the tick interval; a tick that overruns makes the timer skip
//! instead of bursting to catch up.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::InputSettings;
use crate::controller::backend::{InputBackend, RawNotification};
use crate::controller::device::{AxisDirection, Device, InputDeviceEvent};
use crate::controller::registry::{ConnectedDevice, DeviceRegistry, RegistryError, RegistryState};
use crate::controller::translator::{translate, InputEventKind, RawAxis};

/// Outward hot-plug notifications for the front-end.
#[derive(Debug)]
pub enum HotplugNotification {
    /// Sent exactly once per successful attach.
    DeviceConnected(ConnectedDevice),
    /// Sent exactly once per successful detach. The slot is free again.
    DeviceRemoved { slot_index: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum PollLoopError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Hot-plug notifications out of sync with the registry: {0}")]
    ProtocolViolation(RegistryError),

    #[error("Poll task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a single drain.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub notifications: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub protocol_errors: Vec<RegistryError>,
}

#[derive(Clone, Debug)]
pub struct PollSettings {
    pub interval: Duration,
    pub stats_interval: chrono::Duration,
    pub halt_on_protocol_error: bool,
}

impl From<&InputSettings> for PollSettings {
    fn from(settings: &InputSettings) -> Self {
        Self {
            interval: settings.poll_interval(),
            stats_interval: settings.stats_interval(),
            halt_on_protocol_error: settings.halt_on_protocol_error,
        }
    }
}

pub struct PollLoop<B: InputBackend> {
    backend: B,
    registry: Arc<DeviceRegistry>,
    notifier: mpsc::UnboundedSender<HotplugNotification>,
    settings: PollSettings,
    axis_bindings: HashMap<(RawAxis, AxisDirection), InputEventKind>,
}

impl<B: InputBackend> PollLoop<B> {
    pub fn new(
        backend: B,
        registry: Arc<DeviceRegistry>,
        notifier: mpsc::UnboundedSender<HotplugNotification>,
        settings: &InputSettings,
    ) -> Self {
        let axis_bindings = settings
            .axis_bindings
            .iter()
            .map(|binding| ((binding.axis, binding.direction), binding.kind))
            .collect::<HashMap<_, _>>();
        debug!("Poll loop created with {} axis bindings", axis_bindings.len());

        Self {
            backend,
            registry,
            notifier,
            settings: PollSettings::from(settings),
            axis_bindings,
        }
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Processes everything the backend has queued under one registry lock.
    pub fn drain(&mut self) -> Result<DrainReport, PollLoopError> {
        let registry = Arc::clone(&self.registry);
        let mut state = registry.lock()?;
        let mut report = DrainReport::default();

        while let Some(notification) = self.backend.poll() {
            report.notifications += 1;
            self.dispatch(&mut state, notification, &mut report);
        }

        if report.notifications > 0 {
            debug!(
                "Drained {} notifications ({} delivered, {} dropped)",
                report.notifications, report.delivered, report.dropped
            );
        }
        Ok(report)
    }

    fn dispatch(
        &self,
        state: &mut RegistryState,
        notification: RawNotification,
        report: &mut DrainReport,
    ) {
        match notification {
            RawNotification::DeviceAdded {
                slot_index,
                descriptor,
            } => match state.attach(slot_index, descriptor) {
                Ok(connected) => {
                    let instance_id = connected.info.instance_id;
                    if !self.publish(HotplugNotification::DeviceConnected(connected)) {
                        // Nobody will ever hear about this device, so it must not stay attached
                        match state.detach(instance_id) {
                            Ok(_) => debug!(
                                "Rolled back attach of instance {} in slot {}",
                                instance_id, slot_index
                            ),
                            Err(e) => self.protocol_violation(e, report),
                        }
                    }
                }
                Err(RegistryError::AlreadyOccupied {
                    slot_index,
                    occupant,
                }) => {
                    // Some backends announce the first pad of a session twice
                    debug!(
                        "Device already exists at slot {} (instance {})",
                        slot_index, occupant
                    );
                }
                Err(e) => self.protocol_violation(e, report),
            },

            RawNotification::DeviceRemoved { instance_id } => match state.detach(instance_id) {
                Ok(Some(detached)) => {
                    self.publish(HotplugNotification::DeviceRemoved {
                        slot_index: detached.slot_index,
                    });
                }
                Ok(None) => debug!("Stale removal of instance {} ignored", instance_id),
                Err(e) => self.protocol_violation(e, report),
            },

            RawNotification::ButtonChanged {
                instance_id,
                button,
                pressed,
            } => {
                // Button states are still flushed for a pad that was just removed
                let Some(device) = state.resolve(instance_id) else {
                    trace!("Button {} for untracked instance {}", button, instance_id);
                    report.dropped += 1;
                    return;
                };

                let kind = translate(button);
                if kind.is_unknown() {
                    trace!("No logical button for {}, dropping", button);
                    report.dropped += 1;
                    return;
                }

                deliver(device, kind, pressed, report);
            }

            RawNotification::AxisMoved {
                instance_id,
                axis,
                value,
            } => {
                let Some(device) = state.resolve_mut(instance_id) else {
                    trace!("Axis {} for untracked instance {}", axis, instance_id);
                    report.dropped += 1;
                    return;
                };

                for transition in device.update_axis(axis, value) {
                    match self
                        .axis_bindings
                        .get(&(transition.axis, transition.direction))
                    {
                        Some(&kind) => deliver(device, kind, transition.pressed, report),
                        None => trace!(
                            "Axis {} {:?} pressed={} has no binding",
                            transition.axis,
                            transition.direction,
                            transition.pressed
                        ),
                    }
                }
            }

            RawNotification::HatMoved {
                instance_id,
                hat,
                value,
            } => {
                // Not handled yet: the mapping database turns hats into d-pad buttons
                if state.resolve(instance_id).is_none() {
                    report.dropped += 1;
                }
                trace!(
                    "Hat {} moved to {} on instance {}, ignored",
                    hat,
                    value,
                    instance_id
                );
            }
        }
    }

    /// Returns `false` once the consumer has hung up.
    fn publish(&self, notification: HotplugNotification) -> bool {
        match self.notifier.send(notification) {
            Ok(()) => true,
            Err(mpsc::error::SendError(notification)) => {
                debug!("Hot-plug consumer is gone, discarding {:?}", notification);
                false
            }
        }
    }

    fn protocol_violation(&self, error: RegistryError, report: &mut DrainReport) {
        error!("Hot-plug notifications out of sync with registry: {}", error);
        report.protocol_errors.push(error);
    }

    /// Ticks until `cancel` fires, then hands the backend back for teardown.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<B, PollLoopError> {
        info!(
            "Starting poll loop with {:?} interval",
            self.settings.interval
        );

        let mut interval_timer = tokio::time::interval(self.settings.interval);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = PollStats::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Poll loop cancelled");
                    break;
                }
                _ = interval_timer.tick() => {}
            }

            let report = self.drain()?;
            if self.settings.halt_on_protocol_error {
                if let Some(violation) = report.protocol_errors.first() {
                    error!("Stopping poll loop after protocol violation");
                    return Err(PollLoopError::ProtocolViolation(violation.clone()));
                }
            }

            stats.record(&report);
            stats.log_if_due(self.settings.stats_interval);
        }

        Ok(self.backend)
    }
}

fn deliver(device: &Device, kind: InputEventKind, pressed: bool, report: &mut DrainReport) {
    let event = InputDeviceEvent {
        kind,
        pressed,
        owner: device.device_ref(),
        timestamp: Local::now(),
    };
    if device.insert(event) {
        report.delivered += 1;
    } else {
        report.dropped += 1;
    }
}

struct PollStats {
    ticks: u64,
    notifications: usize,
    delivered: usize,
    dropped: usize,
    protocol_errors: usize,
    last_log_time: DateTime<Local>,
}

impl PollStats {
    fn new() -> Self {
        Self {
            ticks: 0,
            notifications: 0,
            delivered: 0,
            dropped: 0,
            protocol_errors: 0,
            last_log_time: Local::now(),
        }
    }

    fn record(&mut self, report: &DrainReport) {
        self.ticks += 1;
        self.notifications += report.notifications;
        self.delivered += report.delivered;
        self.dropped += report.dropped;
        self.protocol_errors += report.protocol_errors.len();
    }

    fn log_if_due(&mut self, stats_interval: chrono::Duration) {
        let now = Local::now();
        if now - self.last_log_time <= stats_interval {
            return;
        }

        info!(
            "Poll stats: {} ticks, {} notifications, {} events delivered, {} dropped in last {} seconds",
            self.ticks,
            self.notifications,
            self.delivered,
            self.dropped,
            (now - self.last_log_time).num_seconds()
        );
        if self.protocol_errors > 0 {
            warn!(
                "{} protocol violations since last report",
                self.protocol_errors
            );
        }
        *self = Self::new();
    }
}

/// Running poll loop task.
pub struct PollLoopHandle<B: InputBackend> {
    cancel: CancellationToken,
    task: JoinHandle<Result<B, PollLoopError>>,
    registry: Arc<DeviceRegistry>,
}

impl<B: InputBackend> PollLoopHandle<B> {
    pub fn spawn(poll_loop: PollLoop<B>) -> Self {
        let cancel = CancellationToken::new();
        let registry = poll_loop.registry();
        let task = tokio::spawn(poll_loop.run(cancel.clone()));
        debug!("Poll loop task spawned");

        Self {
            cancel,
            task,
            registry,
        }
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    /// True once the loop has exited on its own, e.g. after a protocol violation.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops ticking and returns the backend so it can be shut down.
    pub async fn stop(self) -> Result<B, PollLoopError> {
        self.cancel.cancel();
        self.task.await?
    }
}
