//! Observation pipeline.
//!
//! Drains a notification channel, decodes each payload and records it in the
//! registry. This task is the registry's only writer, so per-address history
//! order matches notification arrival order.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::data::{DeviceRegistry, UpsertOutcome};
use crate::error::{Error, Result};
use crate::protocol::ObservationRecord;
use crate::task::{CancelFlag, TaskHandle};

/// What happened to one notification.
#[derive(Debug)]
pub enum ObservationEvent {
    /// Decoded and recorded.
    Recorded {
        /// The decoded record.
        record: ObservationRecord,
        /// Whether the address was new.
        outcome: UpsertOutcome,
    },
    /// Could not be decoded; the registry is unchanged.
    Rejected {
        /// The raw payload, lossily decoded for display.
        payload: String,
        /// Why decoding failed.
        error: Error,
    },
}

/// Decode one payload and record it.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] without touching the registry if the
/// payload does not decode.
pub fn process_payload(
    registry: &DeviceRegistry,
    payload: &[u8],
) -> Result<(ObservationRecord, UpsertOutcome)> {
    let record = ObservationRecord::decode(payload)?;
    let outcome = registry.upsert(record.clone());
    Ok((record, outcome))
}

/// Spawn the pipeline task.
///
/// `on_event` runs on the pipeline task for every notification; keep it cheap
/// (typically a channel send to the UI).
pub fn spawn_observer<F>(
    registry: Arc<DeviceRegistry>,
    receiver: mpsc::Receiver<Bytes>,
    on_event: F,
) -> TaskHandle
where
    F: FnMut(ObservationEvent) + Send + 'static,
{
    TaskHandle::spawn("observer", move |cancel| {
        run_observer(registry, receiver, on_event, cancel)
    })
}

async fn run_observer<F>(
    registry: Arc<DeviceRegistry>,
    mut receiver: mpsc::Receiver<Bytes>,
    mut on_event: F,
    cancel: CancelFlag,
) -> Result<()>
where
    F: FnMut(ObservationEvent) + Send,
{
    let mut recorded: u64 = 0;
    let mut rejected: u64 = 0;

    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            payload = receiver.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        match process_payload(&registry, &payload) {
            Ok((record, outcome)) => {
                recorded += 1;
                on_event(ObservationEvent::Recorded { record, outcome });
            }
            Err(error) => {
                rejected += 1;
                warn!("Dropping notification: {}", error);
                on_event(ObservationEvent::Rejected {
                    payload: String::from_utf8_lossy(&payload).into_owned(),
                    error,
                });
            }
        }
    }

    debug!(
        "Observer stopped: {} recorded, {} rejected",
        recorded, rejected
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_process_payload_round_trip() {
        let registry = DeviceRegistry::new();
        let (record, outcome) =
            process_payload(&registry, b"Beacon1,ignored,[AA:BB:CC:DD:EE:FF],-42").unwrap();

        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(
            registry.history(&record.address).unwrap().last(),
            Some(&record.rssi)
        );
    }

    #[test]
    fn test_malformed_payload_leaves_registry_untouched() {
        let registry = DeviceRegistry::new();
        for payload in [
            &b"Beacon1,ignored,[AA:BB:CC:DD:EE:FF]"[..],
            &b"Beacon1,ignored,[AA:BB:CC:DD:EE:FF],loud"[..],
            &b""[..],
        ] {
            let err = process_payload(&registry, payload).unwrap_err();
            assert!(matches!(err, Error::MalformedPayload { .. }));
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_records_in_arrival_order() {
        let registry = Arc::new(DeviceRegistry::new());
        let (tx, rx) = mpsc::channel(4);
        let events = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let events = events.clone();
            spawn_observer(registry.clone(), rx, move |event| events.lock().push(event))
        };

        for payload in [
            "Beacon1,ignored,[AA:BB:CC:DD:EE:FF],-42",
            "garbage",
            "Beacon1,ignored,[AA:BB:CC:DD:EE:FF],-50",
        ] {
            tx.send(Bytes::from(payload)).await.unwrap();
        }
        drop(tx);

        handle.join().await.unwrap();

        assert_eq!(registry.history("AA:BB:CC:DD:EE:FF").unwrap(), vec![-42, -50]);

        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            ObservationEvent::Recorded {
                outcome: UpsertOutcome::Inserted,
                ..
            }
        ));
        assert!(matches!(events[1], ObservationEvent::Rejected { .. }));
        assert!(matches!(
            events[2],
            ObservationEvent::Recorded {
                outcome: UpsertOutcome::Updated,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_interleaved_addresses_keep_separate_histories() {
        const A: &str = "AA:BB:CC:DD:EE:FF";
        const B: &str = "11:22:33:44:55:66";

        let registry = Arc::new(DeviceRegistry::new());
        let (tx, rx) = mpsc::channel(16);
        let handle = spawn_observer(registry.clone(), rx, |_| {});

        for (i, rssi) in (-60..-50).enumerate() {
            let address = if i % 3 == 0 { B } else { A };
            let payload = format!("dev,Device(ADDR_PUBLIC,[{}],{}", address, rssi);
            tx.send(Bytes::from(payload)).await.unwrap();
        }
        drop(tx);
        handle.join().await.unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.history(B).unwrap(), vec![-60, -57, -54, -51]);
        assert_eq!(
            registry.history(A).unwrap(),
            vec![-59, -58, -56, -55, -53, -52]
        );
        assert!(matches!(
            registry.history("00:00:00:00:00:00"),
            Err(Error::UnknownAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_pipeline_stops_on_cancel() {
        let registry = Arc::new(DeviceRegistry::new());
        let (_tx, rx) = mpsc::channel::<Bytes>(1);
        let handle = spawn_observer(registry, rx, |_| {});

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(1), handle.shutdown()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
