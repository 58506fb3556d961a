//! Presentation adapter.
//!
//! Turns session and registry state into what the terminal front end draws:
//! selection lists keyed by stable identifiers, and the RSSI plot series for
//! one selected device.

use crate::ble::peripheral::{PeripheralInfo, ServiceCharacteristic};
use crate::data::{DeviceEntry, DeviceRegistry};
use crate::error::{Error, Result};
use crate::utils::rssi_bounds;

/// Something that can be listed and selected by a stable key.
pub trait Keyed {
    /// Stable selection key.
    fn key(&self) -> String;
    /// Text shown in the list.
    fn label(&self) -> String;
}

impl Keyed for PeripheralInfo {
    fn key(&self) -> String {
        self.identifier.clone()
    }

    fn label(&self) -> String {
        self.to_string()
    }
}

impl Keyed for ServiceCharacteristic {
    fn key(&self) -> String {
        ServiceCharacteristic::key(self)
    }

    fn label(&self) -> String {
        self.to_string()
    }
}

impl Keyed for DeviceEntry {
    fn key(&self) -> String {
        self.address.clone()
    }

    fn label(&self) -> String {
        self.to_string()
    }
}

/// A selectable list whose selection is remembered by key, not position.
#[derive(Debug, Clone)]
pub struct KeyedSelection<T> {
    items: Vec<T>,
    selected: Option<String>,
}

impl<T: Keyed> KeyedSelection<T> {
    /// An empty list.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            selected: None,
        }
    }

    /// Replace the items, keeping the selection if its key is still present.
    ///
    /// With no surviving selection, the first item is selected.
    pub fn replace_items(&mut self, items: Vec<T>) {
        self.items = items;
        let still_present = self
            .selected
            .as_ref()
            .map(|key| self.items.iter().any(|item| &item.key() == key))
            .unwrap_or(false);

        if !still_present {
            self.selected = self.items.first().map(Keyed::key);
        }
    }

    /// The items, in display order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The selected item.
    pub fn selected(&self) -> Option<&T> {
        let key = self.selected.as_ref()?;
        self.items.iter().find(|item| &item.key() == key)
    }

    /// The selected key.
    pub fn selected_key(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Position of the selected item, for highlighting.
    pub fn selected_index(&self) -> Option<usize> {
        let key = self.selected.as_ref()?;
        self.items.iter().position(|item| &item.key() == key)
    }

    /// Select by key. Returns false if no item has that key.
    pub fn select(&mut self, key: &str) -> bool {
        if self.items.iter().any(|item| item.key() == key) {
            self.selected = Some(key.to_string());
            true
        } else {
            false
        }
    }

    /// Move the selection down, wrapping.
    pub fn select_next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let next = self
            .selected_index()
            .map(|i| (i + 1) % self.items.len())
            .unwrap_or(0);
        self.selected = Some(self.items[next].key());
    }

    /// Move the selection up, wrapping.
    pub fn select_prev(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let prev = match self.selected_index() {
            Some(0) | None => self.items.len() - 1,
            Some(i) => i - 1,
        };
        self.selected = Some(self.items[prev].key());
    }

    /// Clear items and selection.
    pub fn clear(&mut self) {
        self.items.clear();
        self.selected = None;
    }
}

impl<T: Keyed> Default for KeyedSelection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An RSSI-versus-sample-index line series.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    /// Device address.
    pub address: String,
    /// Device name at the time of plotting.
    pub name: String,
    /// `(sample index, rssi)` points.
    pub points: Vec<(f64, f64)>,
    /// X axis bounds.
    pub x_bounds: [f64; 2],
    /// Y axis bounds, padded around the data.
    pub y_bounds: [f64; 2],
}

impl PlotSeries {
    /// Build a series from a history snapshot.
    pub fn from_history(address: &str, name: &str, history: &[i16]) -> Self {
        let points = history
            .iter()
            .enumerate()
            .map(|(i, &rssi)| (i as f64, f64::from(rssi)))
            .collect();

        let (min, max) = rssi_bounds(history).unwrap_or((-100, 0));

        Self {
            address: address.to_string(),
            name: name.to_string(),
            points,
            x_bounds: [0.0, history.len().saturating_sub(1).max(1) as f64],
            y_bounds: [f64::from(min) - 5.0, f64::from(max) + 5.0],
        }
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<f64> {
        self.points.last().map(|&(_, rssi)| rssi)
    }
}

/// The observed-device selector and its plot.
#[derive(Debug, Default)]
pub struct DeviceListView {
    devices: KeyedSelection<DeviceEntry>,
    plot: Option<PlotSeries>,
}

impl DeviceListView {
    /// An empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read the device list from the registry, keeping the selected address.
    pub fn refresh_device_list(&mut self, registry: &DeviceRegistry) {
        self.devices.replace_items(registry.list_addresses());
    }

    /// Build the plot for the selected device and keep it displayed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSelection`] if no device is selected, or
    /// [`Error::UnknownAddress`] if it is not in the registry.
    pub fn plot_history(&mut self, registry: &DeviceRegistry) -> Result<&PlotSeries> {
        let entry = self
            .devices
            .selected()
            .ok_or(Error::NoSelection { what: "address" })?;

        let history = registry.history(&entry.address)?;
        let series = PlotSeries::from_history(&entry.address, &entry.name, &history);
        Ok(self.plot.insert(series))
    }

    /// Rebuild the displayed plot, if any, from current registry data.
    ///
    /// The plot follows the current selection, like a fresh
    /// [`plot_history`](Self::plot_history). Returns whether a plot was redrawn.
    pub fn redraw(&mut self, registry: &DeviceRegistry) -> bool {
        if self.plot.is_none() {
            return false;
        }
        self.plot_history(registry).is_ok()
    }

    /// The devices list.
    pub fn devices(&self) -> &KeyedSelection<DeviceEntry> {
        &self.devices
    }

    /// Mutable access for navigation.
    pub fn devices_mut(&mut self) -> &mut KeyedSelection<DeviceEntry> {
        &mut self.devices
    }

    /// The displayed plot.
    pub fn plot(&self) -> Option<&PlotSeries> {
        self.plot.as_ref()
    }

    /// Stop displaying the plot.
    pub fn clear_plot(&mut self) {
        self.plot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ObservationRecord;
    use pretty_assertions::assert_eq;

    const A: &str = "AA:BB:CC:DD:EE:FF";
    const B: &str = "11:22:33:44:55:66";

    fn peripheral(id: &str) -> PeripheralInfo {
        PeripheralInfo {
            identifier: id.to_string(),
            name: None,
            address: id.to_string(),
            rssi: None,
        }
    }

    #[test]
    fn test_selection_survives_reordering() {
        let mut list = KeyedSelection::new();
        list.replace_items(vec![peripheral("a"), peripheral("b"), peripheral("c")]);
        assert_eq!(list.selected_key(), Some("a"));

        assert!(list.select("b"));
        list.replace_items(vec![peripheral("c"), peripheral("b")]);
        assert_eq!(list.selected_key(), Some("b"));
        assert_eq!(list.selected_index(), Some(1));
    }

    #[test]
    fn test_selection_falls_back_to_first() {
        let mut list = KeyedSelection::new();
        list.replace_items(vec![peripheral("a"), peripheral("b")]);
        list.select("b");
        list.replace_items(vec![peripheral("x")]);
        assert_eq!(list.selected_key(), Some("x"));

        list.replace_items(Vec::new());
        assert!(list.selected().is_none());
    }

    #[test]
    fn test_navigation_wraps() {
        let mut list = KeyedSelection::new();
        list.replace_items(vec![peripheral("a"), peripheral("b")]);
        list.select_prev();
        assert_eq!(list.selected_key(), Some("b"));
        list.select_next();
        assert_eq!(list.selected_key(), Some("a"));
        assert!(!list.select("missing"));
    }

    #[test]
    fn test_refresh_preserves_selected_address() {
        let registry = DeviceRegistry::new();
        let mut view = DeviceListView::new();

        registry.upsert(ObservationRecord::new("a", A, -40));
        view.refresh_device_list(&registry);
        assert_eq!(view.devices().selected_key(), Some(A));

        registry.upsert(ObservationRecord::new("b", B, -60));
        view.refresh_device_list(&registry);
        assert_eq!(view.devices().selected_key(), Some(A));
        assert!(view.devices_mut().select(B));
        registry.upsert(ObservationRecord::new("a", A, -41));
        view.refresh_device_list(&registry);

        assert_eq!(view.devices().selected_key(), Some(B));
        assert_eq!(view.devices().len(), 2);
    }

    #[test]
    fn test_plot_requires_selection() {
        let registry = DeviceRegistry::new();
        let mut view = DeviceListView::new();
        let err = view.plot_history(&registry).unwrap_err();
        assert!(matches!(err, Error::NoSelection { .. }));
        assert!(view.plot().is_none());
    }

    #[test]
    fn test_plot_and_redraw() {
        let registry = DeviceRegistry::new();
        let mut view = DeviceListView::new();
        assert!(!view.redraw(&registry));

        registry.upsert(ObservationRecord::new("Beacon1", A, -42));
        registry.upsert(ObservationRecord::new("Beacon1", A, -50));
        view.refresh_device_list(&registry);

        let series = view.plot_history(&registry).unwrap();
        assert_eq!(series.points, vec![(0.0, -42.0), (1.0, -50.0)]);
        assert_eq!(series.y_bounds, [-55.0, -37.0]);

        registry.upsert(ObservationRecord::new("Beacon1", A, -45));
        assert!(view.redraw(&registry));
        assert_eq!(view.plot().unwrap().points.len(), 3);
        assert_eq!(view.plot().unwrap().latest(), Some(-45.0));
    }

    #[test]
    fn test_series_from_single_sample() {
        let series = PlotSeries::from_history(A, "n", &[-70]);
        assert_eq!(series.x_bounds, [0.0, 1.0]);
        assert_eq!(series.y_bounds, [-75.0, -65.0]);
    }
}
