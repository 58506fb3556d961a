//! GATT notification subscriptions.
//!
//! A subscription forwards every notification from one characteristic into
//! a bounded channel, in arrival order, until the peripheral disconnects or
//! the forwarding task is cancelled.

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::ble::peripheral::ServiceCharacteristic;
use crate::error::{Error, Result};
use crate::task::{CancelFlag, TaskHandle};

/// An active notification subscription.
#[derive(Debug)]
pub struct NotificationSubscription {
    /// The subscribed pair.
    pub pair: ServiceCharacteristic,
    /// Raw payloads in arrival order.
    pub receiver: mpsc::Receiver<Bytes>,
    /// The forwarding task.
    pub task: TaskHandle,
}

/// Find the characteristic for `pair` among the peripheral's discovered services.
pub fn find_characteristic(
    peripheral: &Peripheral,
    pair: &ServiceCharacteristic,
) -> Result<Characteristic> {
    peripheral
        .services()
        .into_iter()
        .filter(|service| service.uuid == pair.service)
        .flat_map(|service| service.characteristics)
        .find(|characteristic| characteristic.uuid == pair.characteristic)
        .ok_or_else(|| Error::CharacteristicNotFound {
            uuid: pair.characteristic.to_string(),
        })
}

/// Subscribe to `pair` and start forwarding its notifications.
pub async fn subscribe(
    peripheral: &Peripheral,
    pair: ServiceCharacteristic,
    capacity: usize,
) -> Result<NotificationSubscription> {
    let characteristic = find_characteristic(peripheral, &pair)?;

    debug!(
        "Found characteristic {}, properties: {:?}",
        characteristic.uuid, characteristic.properties
    );

    peripheral
        .subscribe(&characteristic)
        .await
        .map_err(Error::Bluetooth)?;

    let notifications = peripheral.notifications().await.map_err(Error::Bluetooth)?;
    let (tx, receiver) = mpsc::channel(capacity.max(1));

    let task = TaskHandle::spawn(format!("notify:{}", pair.characteristic), |cancel| {
        let stream = notifications.map(|n| (n.uuid, n.value));
        forward_notifications(stream, pair.characteristic, tx, cancel)
    });

    debug!("Subscribed to notifications from {}", pair.characteristic);

    Ok(NotificationSubscription {
        pair,
        receiver,
        task,
    })
}

/// Forward payloads for `characteristic` from `stream` into `tx`.
///
/// Ends when the stream ends (disconnect), the receiver is dropped, or the
/// task is cancelled. Backpressure from a full channel holds the stream.
pub(crate) async fn forward_notifications<S>(
    stream: S,
    characteristic: Uuid,
    tx: mpsc::Sender<Bytes>,
    cancel: CancelFlag,
) -> Result<()>
where
    S: Stream<Item = (Uuid, Vec<u8>)> + Send,
{
    let mut stream = std::pin::pin!(stream);
    let mut forwarded: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => {
                let Some((uuid, value)) = next else {
                    debug!("Notification stream ended");
                    break;
                };

                if uuid != characteristic {
                    trace!("Ignoring notification from {}", uuid);
                    continue;
                }

                trace!("Notification: {} bytes", value.len());

                if tx.send(Bytes::from(value)).await.is_err() {
                    warn!("Notification receiver dropped");
                    break;
                }
                forwarded += 1;
            }
        }
    }

    debug!("Notification forwarder stopped after {} payloads", forwarded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::OBSERVER_CHARACTERISTIC_UUID;

    #[tokio::test]
    async fn test_forwards_matching_characteristic_in_order() {
        let other = Uuid::from_u128(1);
        let stream = futures::stream::iter(vec![
            (OBSERVER_CHARACTERISTIC_UUID, b"one".to_vec()),
            (other, b"ignored".to_vec()),
            (OBSERVER_CHARACTERISTIC_UUID, b"two".to_vec()),
        ]);

        let (tx, mut rx) = mpsc::channel(8);
        forward_notifications(stream, OBSERVER_CHARACTERISTIC_UUID, tx, CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(Bytes::from_static(b"one")));
        assert_eq!(rx.recv().await, Some(Bytes::from_static(b"two")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_stops_when_cancelled() {
        let stream = futures::stream::pending::<(Uuid, Vec<u8>)>();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            forward_notifications(stream, OBSERVER_CHARACTERISTIC_UUID, tx, cancel),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let stream = futures::stream::iter(vec![
            (OBSERVER_CHARACTERISTIC_UUID, b"a".to_vec()),
            (OBSERVER_CHARACTERISTIC_UUID, b"b".to_vec()),
        ]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        forward_notifications(stream, OBSERVER_CHARACTERISTIC_UUID, tx, CancelFlag::new())
            .await
            .unwrap();
    }
}
