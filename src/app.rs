//! Application context.
//!
//! [`ObserverContext`] owns everything the front end acts on: the registry,
//! the BLE session, the serial link, the selection lists, the event log and
//! every background task. Each user action is one method that returns
//! immediately; slow work runs on a supervised task and reports back through
//! [`AppEvent`]s that [`ObserverContext::tick`] applies on the UI task.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::ble::connection::DisconnectOutcome;
use crate::ble::peripheral::{AdapterInfo, PeripheralInfo, ServiceCharacteristic};
use crate::config::ObserverConfig;
use crate::data::{DeviceRegistry, UpsertOutcome};
use crate::error::{Error, Result};
use crate::observer::{spawn_observer, ObservationEvent};
use crate::presentation::{DeviceListView, KeyedSelection};
use crate::protocol::PicoCommand;
use crate::session::BleSession;
use crate::task::TaskHandle;
use crate::transport::{SerialEvent, SerialLink};

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Something the user should notice.
    Warn,
    /// A failed action.
    Error,
}

impl LogLevel {
    /// Fixed-width label.
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Event log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// When the entry was written.
    pub timestamp: DateTime<Local>,
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
}

/// Scrolling event log with a fixed capacity.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
}

impl EventLog {
    /// An empty log keeping at most `max_entries`.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Append an entry, dropping the oldest when full.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });

        // Trim old entries
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A modal message the front end shows until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    /// Severity, which picks the dialog style.
    pub level: LogLevel,
    /// Title bar text.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Dialog {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            title: "Success".to_string(),
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warn,
            title: "Warning".to_string(),
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            title: "Error".to_string(),
            message: message.into(),
        }
    }
}

/// Messages from background tasks to the UI task.
#[derive(Debug)]
pub enum AppEvent {
    /// Append to the event log.
    Log(LogLevel, String),
    /// The BLE session was created.
    SessionReady(Arc<BleSession>),
    /// An adapter was selected.
    AdapterSelected(AdapterInfo),
    /// A scan finished.
    PeripheralsFound(Vec<PeripheralInfo>),
    /// A peripheral connected and listed its characteristics.
    Connected {
        /// Peripheral identifier.
        identifier: String,
        /// Its service/characteristic pairs.
        pairs: Vec<ServiceCharacteristic>,
    },
    /// Notification delivery started; the handles are now supervised by the context.
    Observing(Vec<TaskHandle>),
    /// The adapter's link watcher started.
    Watching(TaskHandle),
    /// A connected peripheral dropped the link without a local disconnect.
    LinkLost {
        /// Peripheral identifier.
        identifier: String,
    },
    /// A peripheral was disconnected (possibly with a benign fault).
    Disconnected {
        /// Peripheral identifier.
        identifier: String,
        /// What happened.
        outcome: DisconnectOutcome,
    },
    /// One notification went through the pipeline.
    Observation(ObservationEvent),
    /// The serial reader saw something.
    Serial(SerialEvent),
}

/// The explicit session context behind the UI.
pub struct ObserverContext {
    config: ObserverConfig,
    registry: Arc<DeviceRegistry>,
    session: Option<Arc<BleSession>>,
    adapter: Option<AdapterInfo>,
    serial: Option<Arc<SerialLink>>,
    peripherals: KeyedSelection<PeripheralInfo>,
    pairs: KeyedSelection<ServiceCharacteristic>,
    devices: DeviceListView,
    connected: Option<String>,
    active_pair: Option<ServiceCharacteristic>,
    log: EventLog,
    dialog: Option<Dialog>,
    tasks: Vec<TaskHandle>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl ObserverContext {
    /// Create a context with no hardware attached yet.
    pub fn new(config: ObserverConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(DeviceRegistry::with_retention(config.history_retention));
        let log = EventLog::new(config.max_log_entries);

        Self {
            config,
            registry,
            session: None,
            adapter: None,
            serial: None,
            peripherals: KeyedSelection::new(),
            pairs: KeyedSelection::new(),
            devices: DeviceListView::new(),
            connected: None,
            active_pair: None,
            log,
            dialog: None,
            tasks: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    // ------------------------------------------------------------------
    // Serial actions
    // ------------------------------------------------------------------

    /// Detect the Pico, open it, and start echoing its output to the log.
    pub fn initialize_serial(&mut self) {
        if self.serial.as_ref().is_some_and(|link| link.is_open()) {
            self.warn_dialog("Serial connection already initialized.");
            return;
        }

        let link = match SerialLink::open_detected(&self.config) {
            Ok(link) => Arc::new(link),
            Err(Error::TransportUnavailable) => {
                self.warn_dialog("No Pico device detected. Please connect your Pico.");
                return;
            }
            Err(e) => {
                error!("Could not open serial port: {}", e);
                self.dialog = Some(Dialog::error(format!("Could not open serial port: {}", e)));
                return;
            }
        };

        let port_name = link.port_name().to_string();
        let events = self.events_tx.clone();
        match link.spawn_reader(move |event| {
            let _ = events.send(AppEvent::Serial(event));
        }) {
            Ok(task) => self.tasks.push(task),
            Err(e) => {
                self.log(LogLevel::Error, format!("Could not start serial reader: {}", e));
                return;
            }
        }

        self.log(LogLevel::Info, format!("Pico detected on {}", port_name));
        self.dialog = Some(Dialog::info(format!(
            "Pico detected on {} and initialized!",
            port_name
        )));
        self.serial = Some(link);
    }

    /// Send one command to the Pico.
    pub fn send_command(&mut self, command: PicoCommand) {
        let Some(link) = self.serial.as_ref().filter(|link| link.is_open()).cloned() else {
            self.warn_dialog("Serial connection not initialized.");
            return;
        };

        match link.send(command) {
            Ok(()) => self.log(
                LogLevel::Info,
                format!("Sent {} command to Pico.", command.description()),
            ),
            Err(e) => self.log(
                LogLevel::Error,
                format!("Error sending {} command: {}", command.description(), e),
            ),
        }
    }

    /// Close the serial link. The reader stops on its next poll.
    pub fn close_serial(&mut self) {
        if let Some(link) = self.serial.take() {
            if link.close() {
                self.log(LogLevel::Info, "Serial connection closed.");
            }
        }
    }

    // ------------------------------------------------------------------
    // BLE actions
    // ------------------------------------------------------------------

    /// Select the first adapter and scan for peripherals.
    pub fn initialize_adapter(&mut self) {
        let session = self.session.clone();
        let config = self.config.clone();
        let events = self.events_tx.clone();
        let watching = self.is_running("link-watch:");

        self.spawn("adapter-init", move |_| async move {
            let session = match session {
                Some(session) => session,
                None => {
                    let session = Arc::new(BleSession::new(&config).await?);
                    let _ = events.send(AppEvent::SessionReady(session.clone()));
                    session
                }
            };

            let adapters = session.list_adapters().await?;
            let adapter = adapters.into_iter().next().ok_or(Error::NoAdapter)?;
            let _ = events.send(AppEvent::AdapterSelected(adapter.clone()));

            if !watching {
                let lost = events.clone();
                let watcher = session
                    .watch_disconnections(adapter.index, move |identifier| {
                        let _ = lost.send(AppEvent::LinkLost { identifier });
                    })
                    .await;
                match watcher {
                    Ok(task) => {
                        let _ = events.send(AppEvent::Watching(task));
                    }
                    Err(e) => {
                        let _ = events.send(AppEvent::Log(
                            LogLevel::Warn,
                            format!("Dropped links will not be detected: {}", e),
                        ));
                    }
                }
            }

            let _ = events.send(AppEvent::Log(
                LogLevel::Info,
                "Scanning for available devices...".to_string(),
            ));

            let found = session.scan(adapter.index).await?;
            let _ = events.send(AppEvent::Log(
                LogLevel::Info,
                "Finished scanning.".to_string(),
            ));
            let _ = events.send(AppEvent::PeripheralsFound(found));
            Ok(())
        });
    }

    /// Connect to the selected peripheral and list its characteristics.
    pub fn set_peripheral(&mut self) {
        let Some(session) = self.session.clone() else {
            self.warn_dialog("Bluetooth adapter not initialized.");
            return;
        };
        let Some(identifier) = self.peripherals.selected_key().map(str::to_string) else {
            self.warn_dialog("No peripheral selected.");
            return;
        };

        self.log(LogLevel::Info, "Connecting to selected peripheral...");
        let events = self.events_tx.clone();

        self.spawn("connect", move |_| async move {
            session.connect(&identifier).await?;
            let _ = events.send(AppEvent::Log(
                LogLevel::Info,
                "Peripheral connected! getting services...".to_string(),
            ));
            let pairs = session.service_characteristic_pairs(&identifier)?;
            let _ = events.send(AppEvent::Connected { identifier, pairs });
            Ok(())
        });
    }

    /// Use the selected service/characteristic pair for observation.
    pub fn set_characteristic(&mut self) {
        match self.pairs.selected().copied() {
            Some(pair) => {
                self.active_pair = Some(pair);
                self.log(LogLevel::Info, "Service-Characteristic pair set.");
            }
            None => self.warn_dialog("No service/characteristic pair selected."),
        }
    }

    /// Subscribe to the active pair and feed notifications into the registry.
    pub fn start_observing(&mut self) {
        if self.is_observing() || self.is_running("subscribe") {
            self.warn_dialog("Already observing.");
            return;
        }
        let (Some(session), Some(identifier)) = (self.session.clone(), self.connected.clone())
        else {
            self.warn_dialog("No peripheral connected.");
            return;
        };
        let Some(pair) = self.active_pair else {
            self.warn_dialog("No service/characteristic pair set.");
            return;
        };

        let registry = self.registry.clone();
        let events = self.events_tx.clone();

        self.spawn("subscribe", move |_| async move {
            let subscription = session.subscribe(&identifier, pair).await?;

            let observer_events = events.clone();
            let observer = spawn_observer(registry, subscription.receiver, move |event| {
                let _ = observer_events.send(AppEvent::Observation(event));
            });

            let _ = events.send(AppEvent::Log(
                LogLevel::Info,
                format!("Observing {}", pair.characteristic),
            ));
            let _ = events.send(AppEvent::Observing(vec![subscription.task, observer]));
            Ok(())
        });
    }

    /// Stop observing and disconnect the connected peripheral.
    pub fn disconnect(&mut self) {
        let Some(session) = self.session.clone() else {
            self.warn_dialog("Bluetooth adapter not initialized.");
            return;
        };
        let Some(identifier) = self
            .connected
            .clone()
            .or_else(|| self.peripherals.selected_key().map(str::to_string))
        else {
            self.warn_dialog("No peripheral selected.");
            return;
        };

        for task in self.observation_tasks() {
            task.cancel();
        }

        let events = self.events_tx.clone();
        self.spawn("disconnect", move |_| async move {
            let outcome = session.disconnect(&identifier).await;
            let _ = events.send(AppEvent::Disconnected {
                identifier,
                outcome,
            });
            Ok(())
        });
    }

    /// Plot the selected device's RSSI history and keep it live.
    pub fn graph_selected(&mut self) {
        let plotted = self
            .devices
            .plot_history(&self.registry)
            .map(|series| format!("Plotting {} ({} samples)", series.address, series.points.len()));

        match plotted {
            Ok(message) => self.log(LogLevel::Info, message),
            Err(Error::NoSelection { .. }) => self.warn_dialog("No address found."),
            Err(e) => self.warn_dialog(e.to_string()),
        }
    }

    // ------------------------------------------------------------------
    // UI loop support
    // ------------------------------------------------------------------

    /// Apply pending events, refresh the device list and collect finished tasks.
    pub async fn tick(&mut self) {
        let mut observed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            observed |= self.apply(event);
        }

        if observed {
            self.devices.refresh_device_list(&self.registry);
            self.devices.redraw(&self.registry);
        }

        self.reap_tasks().await;
    }

    /// Stop everything: serial, observation, connections.
    pub async fn shutdown(&mut self) {
        info!("Shutting down observer context");
        self.close_serial();

        for task in &self.tasks {
            task.cancel();
        }

        if let Some(session) = &self.session {
            session.shutdown().await;
        }

        for task in std::mem::take(&mut self.tasks) {
            let name = task.name().to_string();
            match tokio::time::timeout(std::time::Duration::from_secs(2), task.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Task '{}' ended with error during shutdown: {}", name, e),
                Err(_) => warn!("Task '{}' did not stop in time", name),
            }
        }
    }

    /// Dismiss the current dialog.
    pub fn dismiss_dialog(&mut self) {
        self.dialog = None;
    }

    /// Append to the event log.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        debug!("[{}] {}", level.label().trim(), message);
        self.log.push(level, message);
    }

    // ------------------------------------------------------------------
    // Accessors for rendering
    // ------------------------------------------------------------------

    /// The device registry.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The event log.
    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// The dialog to show, if any.
    pub fn dialog(&self) -> Option<&Dialog> {
        self.dialog.as_ref()
    }

    /// The peripheral selector.
    pub fn peripherals(&self) -> &KeyedSelection<PeripheralInfo> {
        &self.peripherals
    }

    /// Mutable peripheral selector, for navigation.
    pub fn peripherals_mut(&mut self) -> &mut KeyedSelection<PeripheralInfo> {
        &mut self.peripherals
    }

    /// The service/characteristic selector.
    pub fn pairs(&self) -> &KeyedSelection<ServiceCharacteristic> {
        &self.pairs
    }

    /// Mutable service/characteristic selector, for navigation.
    pub fn pairs_mut(&mut self) -> &mut KeyedSelection<ServiceCharacteristic> {
        &mut self.pairs
    }

    /// The observed-device selector and plot.
    pub fn devices(&self) -> &DeviceListView {
        &self.devices
    }

    /// Mutable observed-device selector, for navigation.
    pub fn devices_mut(&mut self) -> &mut DeviceListView {
        &mut self.devices
    }

    /// The selected adapter.
    pub fn adapter(&self) -> Option<&AdapterInfo> {
        self.adapter.as_ref()
    }

    /// The connected peripheral's identifier.
    pub fn connected_peripheral(&self) -> Option<&str> {
        self.connected.as_deref()
    }

    /// The pair being observed or about to be.
    pub fn active_pair(&self) -> Option<&ServiceCharacteristic> {
        self.active_pair.as_ref()
    }

    /// The open serial port's name.
    pub fn serial_port(&self) -> Option<&str> {
        self.serial
            .as_ref()
            .filter(|link| link.is_open())
            .map(|link| link.port_name())
    }

    /// Whether notifications are being observed.
    pub fn is_observing(&self) -> bool {
        self.observation_tasks().any(|task| !task.is_finished())
    }

    /// Number of supervised tasks still tracked.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// A sender for posting events, e.g. from custom workers.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.events_tx.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn spawn<F, Fut>(&mut self, name: &str, worker: F)
    where
        F: FnOnce(crate::task::CancelFlag) -> Fut,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.push(TaskHandle::spawn(name, worker));
    }

    fn is_running(&self, name_prefix: &str) -> bool {
        self.tasks
            .iter()
            .any(|task| task.name().starts_with(name_prefix) && !task.is_finished())
    }

    fn observation_tasks(&self) -> impl Iterator<Item = &TaskHandle> {
        self.tasks
            .iter()
            .filter(|task| task.name() == "observer" || task.name().starts_with("notify:"))
    }

    fn warn_dialog(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.log(LogLevel::Warn, message.clone());
        self.dialog = Some(Dialog::warning(message));
    }

    /// Apply one event. Returns whether the registry changed.
    fn apply(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Log(level, message) => self.log(level, message),
            AppEvent::SessionReady(session) => self.session = Some(session),
            AppEvent::AdapterSelected(adapter) => {
                self.log(
                    LogLevel::Info,
                    format!("Initialized adapter {}", adapter.description),
                );
                self.adapter = Some(adapter);
            }
            AppEvent::PeripheralsFound(found) => {
                self.log(LogLevel::Info, format!("Found {} peripherals", found.len()));
                self.peripherals.replace_items(found);
            }
            AppEvent::Connected { identifier, pairs } => {
                self.log(
                    LogLevel::Info,
                    format!("{} offers {} characteristics", identifier, pairs.len()),
                );
                self.connected = Some(identifier);
                self.pairs.replace_items(pairs);
                let observer_stream = self
                    .pairs
                    .items()
                    .iter()
                    .find(|p| p.is_observer_stream())
                    .map(|p| p.key());
                if let Some(key) = observer_stream {
                    self.pairs.select(&key);
                }
            }
            AppEvent::Observing(tasks) => self.tasks.extend(tasks),
            AppEvent::Watching(task) => {
                if self.is_running("link-watch:") {
                    debug!("Link watcher already running; dropping '{}'", task.name());
                } else {
                    self.tasks.push(task);
                }
            }
            AppEvent::LinkLost { identifier } => {
                if self.connected.as_deref() == Some(identifier.as_str()) {
                    for task in self.observation_tasks() {
                        task.cancel();
                    }
                    self.connected = None;
                }
                self.warn_dialog(format!("Lost connection to {}.", identifier));
            }
            AppEvent::Disconnected {
                identifier,
                outcome,
            } => {
                if let DisconnectOutcome::Faulted(fault) = &outcome {
                    self.log(LogLevel::Warn, fault.to_string());
                }
                if self.connected.as_deref() == Some(identifier.as_str()) {
                    self.connected = None;
                }
                self.log(LogLevel::Info, "Disconnected from peripheral.");
            }
            AppEvent::Observation(ObservationEvent::Recorded { record, outcome }) => {
                self.log(LogLevel::Info, format!("GOT: {}", record));
                if outcome == UpsertOutcome::Inserted {
                    debug!("First sighting of {}", record.address);
                }
                return true;
            }
            AppEvent::Observation(ObservationEvent::Rejected { payload, error }) => {
                self.log(
                    LogLevel::Warn,
                    format!("Dropped notification {:?}: {}", payload, error),
                );
            }
            AppEvent::Serial(SerialEvent::Line(line)) => self.log(LogLevel::Info, line),
            AppEvent::Serial(SerialEvent::ReadError(e)) => {
                self.log(LogLevel::Error, format!("Error reading from serial: {}", e));
            }
        }
        false
    }

    async fn reap_tasks(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(TaskHandle::is_finished);
        self.tasks = running;

        for task in finished {
            let name = task.name().to_string();
            match task.join().await {
                Ok(()) => debug!("Task '{}' finished", name),
                Err(Error::NoAdapter) => {
                    self.log(LogLevel::Error, format!("{} failed: no Bluetooth adapter", name));
                    self.dialog = Some(Dialog::warning("No Bluetooth adapter available."));
                }
                Err(e) => {
                    error!("Task '{}' failed: {}", name, e);
                    self.log(LogLevel::Error, format!("{} failed: {}", name, e));
                }
            }
        }
    }
}

impl Drop for ObserverContext {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.cancel();
        }
    }
}
