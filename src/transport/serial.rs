//! USB serial link to the Pico.

use parking_lot::Mutex;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::lines::{LineRead, LineReader};
use crate::config::ObserverConfig;
use crate::error::{Error, Result};
use crate::protocol::PicoCommand;
use crate::task::{CancelFlag, TaskHandle};

/// A serial port as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescription {
    /// OS device name (`/dev/ttyACM0`, `COM3`, ...).
    pub port_name: String,
    /// Human-readable description (USB manufacturer and product when known).
    pub description: String,
    /// USB vendor id, for USB ports.
    pub vid: Option<u16>,
}

impl PortDescription {
    /// Whether this port looks like a Pico under `config`.
    pub fn is_pico(&self, config: &ObserverConfig) -> bool {
        let by_vid = self
            .vid
            .map(|vid| config.usb_vendor_ids.contains(&vid))
            .unwrap_or(false);

        by_vid || matches_marker(&self.description, &config.port_markers)
    }
}

impl From<SerialPortInfo> for PortDescription {
    fn from(info: SerialPortInfo) -> Self {
        let (description, vid) = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let parts: Vec<String> = [usb.manufacturer, usb.product]
                    .into_iter()
                    .flatten()
                    .collect();
                let description = if parts.is_empty() {
                    "USB Serial Device".to_string()
                } else {
                    parts.join(" ")
                };
                (description, Some(usb.vid))
            }
            SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None),
            SerialPortType::PciPort => ("PCI".to_string(), None),
            SerialPortType::Unknown => ("n/a".to_string(), None),
        };

        Self {
            port_name: info.port_name,
            description,
            vid,
        }
    }
}

/// Whether `description` contains any of `markers`.
pub fn matches_marker(description: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .any(|marker| !marker.is_empty() && description.contains(marker.as_str()))
}

/// List the serial ports on this system.
pub fn list_ports() -> Result<Vec<PortDescription>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(PortDescription::from).collect())
}

/// Pick the first port in `ports` that looks like a Pico.
pub fn find_pico<'a>(
    ports: &'a [PortDescription],
    config: &ObserverConfig,
) -> Option<&'a PortDescription> {
    ports.iter().find(|port| port.is_pico(config))
}

/// Find the Pico's serial port name.
///
/// # Errors
///
/// Returns [`Error::TransportUnavailable`] if no port matches.
pub fn detect_pico(config: &ObserverConfig) -> Result<String> {
    let ports = list_ports()?;
    for port in &ports {
        debug!("Serial port {}: {}", port.port_name, port.description);
    }

    find_pico(&ports, config)
        .map(|port| port.port_name.clone())
        .ok_or(Error::TransportUnavailable)
}

/// Something the reader worker saw on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// A complete line from the Pico.
    Line(String),
    /// A read failed; the worker keeps polling.
    ReadError(String),
}

/// An open serial connection to the Pico.
pub struct SerialLink {
    port_name: String,
    port: Mutex<Option<Box<dyn SerialPort>>>,
    open: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl SerialLink {
    /// Open `port_name` with the configured baud rate and read timeout.
    pub fn open(port_name: &str, config: &ObserverConfig) -> Result<Self> {
        let port = serialport::new(port_name, config.baud_rate)
            .timeout(config.read_timeout)
            .open()?;

        info!("Opened serial port {} at {} baud", port_name, config.baud_rate);

        Ok(Self {
            port_name: port_name.to_string(),
            port: Mutex::new(Some(port)),
            open: Arc::new(AtomicBool::new(true)),
            poll_interval: config.poll_interval,
        })
    }

    /// Detect the Pico and open it.
    pub fn open_detected(config: &ObserverConfig) -> Result<Self> {
        let port_name = detect_pico(config)?;
        Self::open(&port_name, config)
    }

    /// The OS port name.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Whether the link is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Write one command line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the link is closed and
    /// [`Error::TransportIo`] if the write fails.
    pub fn send(&self, command: PicoCommand) -> Result<()> {
        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(Error::NotConnected)?;
        if !self.is_open() {
            return Err(Error::NotConnected);
        }

        port.write_all(command.as_line())?;
        port.flush()?;
        debug!("Sent {:?} to {}", command.keyword(), self.port_name);
        Ok(())
    }

    /// Close the link. Returns whether it was open.
    pub fn close(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        self.port.lock().take();
        if was_open {
            info!("Closed serial port {}", self.port_name);
        }
        was_open
    }

    /// Start the background line reader.
    ///
    /// The worker owns a cloned port handle and stops within one read timeout
    /// plus one poll interval after [`close`](Self::close) or cancellation.
    pub fn spawn_reader<F>(&self, sink: F) -> Result<TaskHandle>
    where
        F: FnMut(SerialEvent) + Send + 'static,
    {
        let reader = {
            let guard = self.port.lock();
            let port = guard.as_ref().ok_or(Error::NotConnected)?;
            port.try_clone()?
        };

        let open = self.open.clone();
        let poll_interval = self.poll_interval;
        let name = format!("serial-reader:{}", self.port_name);

        Ok(TaskHandle::spawn_blocking(name, move |cancel| {
            let mut sink = sink;
            run_reader(
                LineReader::new(reader),
                &open,
                &cancel,
                poll_interval,
                &mut sink,
            )
        }))
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// The reader loop: poll for lines until the link closes or the task is cancelled.
pub(crate) fn run_reader<R, F>(
    mut reader: LineReader<R>,
    open: &AtomicBool,
    cancel: &CancelFlag,
    poll_interval: Duration,
    sink: &mut F,
) -> Result<()>
where
    R: Read,
    F: FnMut(SerialEvent),
{
    while open.load(Ordering::SeqCst) && !cancel.is_cancelled() {
        match reader.poll_line() {
            Ok(LineRead::Line(line)) => {
                sink(SerialEvent::Line(line));
                continue;
            }
            Ok(LineRead::Pending) => {}
            Ok(LineRead::Closed) => {
                debug!("Serial stream closed");
                break;
            }
            Err(e) => {
                warn!("Error reading from serial: {}", e);
                sink(SerialEvent::ReadError(e.to_string()));
            }
        }
        std::thread::sleep(poll_interval);
    }

    debug!("Serial reader stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn port(name: &str, description: &str, vid: Option<u16>) -> PortDescription {
        PortDescription {
            port_name: name.to_string(),
            description: description.to_string(),
            vid,
        }
    }

    #[test]
    fn test_marker_matching() {
        let markers = ObserverConfig::default().port_markers;
        assert!(matches_marker("Raspberry Pi Pico", &markers));
        assert!(matches_marker("USB Serial Device (COM3)", &markers));
        assert!(!matches_marker("FT232R USB UART", &markers));
        assert!(!matches_marker("anything", &[String::new()]));
    }

    #[test]
    fn test_find_pico_by_description_or_vid() {
        let config = ObserverConfig::default();
        let ports = vec![
            port("/dev/ttyS0", "n/a", None),
            port("/dev/ttyUSB0", "FTDI FT232R USB UART", Some(0x0403)),
            port("/dev/ttyACM0", "MicroPython Board in FS mode", Some(0x2E8A)),
        ];
        assert_eq!(
            find_pico(&ports, &config).map(|p| p.port_name.as_str()),
            Some("/dev/ttyACM0")
        );

        let ports = vec![port("COM3", "USB Serial Device", None)];
        assert_eq!(
            find_pico(&ports, &config).map(|p| p.port_name.as_str()),
            Some("COM3")
        );

        let ports = vec![port("/dev/ttyUSB0", "CP2102", Some(0x10C4))];
        assert!(find_pico(&ports, &config).is_none());
    }

    #[test]
    fn test_reader_forwards_lines_until_eof() {
        let open = AtomicBool::new(true);
        let cancel = CancelFlag::new();
        let mut seen = Vec::new();

        run_reader(
            LineReader::new(Cursor::new(b"Scanning...\nDevice 1 | RSSI: -40\n".to_vec())),
            &open,
            &cancel,
            Duration::from_millis(1),
            &mut |event| seen.push(event),
        )
        .unwrap();

        assert_eq!(
            seen,
            vec![
                SerialEvent::Line("Scanning...".into()),
                SerialEvent::Line("Device 1 | RSSI: -40".into()),
            ]
        );
    }

    #[test]
    fn test_reader_stops_when_closed() {
        let open = AtomicBool::new(false);
        let cancel = CancelFlag::new();
        let mut seen = Vec::new();

        run_reader(
            LineReader::new(Cursor::new(b"never read\n".to_vec())),
            &open,
            &cancel,
            Duration::from_millis(1),
            &mut |event| seen.push(event),
        )
        .unwrap();

        assert!(seen.is_empty());
    }

    #[test]
    fn test_open_missing_port_fails() {
        let config = ObserverConfig::default();
        let result = SerialLink::open("/dev/pico-ble-observer-does-not-exist", &config);
        assert!(matches!(result, Err(Error::Serial(_))));
    }
}
