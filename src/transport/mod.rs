//! Serial transport to the Pico.
//!
//! Port detection, newline-terminated command writes and a supervised line
//! reader built on the `serialport` crate.

pub mod lines;
pub mod serial;

pub use lines::{LineRead, LineReader};
pub use serial::{detect_pico, list_ports, PortDescription, SerialEvent, SerialLink};
