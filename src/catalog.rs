//! Read-only lookup of device and peripheral properties by numeric id.
//!
//! Discovery only learns numeric ids from the hardware; names, motion types
//! and unit scales come from a [`DeviceCatalog`]. Lookups never fail: an
//! unknown id yields a placeholder record named after the id, so an
//! unrecognized product is still usable in native units.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::LoadError;
use crate::units::{MotionType, UnitConverter};

fn unit_scale() -> f64 {
    1.0
}

/// Properties of one peripheral (or of an integrated device's own axis,
/// which uses peripheral id 0 and an empty name).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PeripheralRecord {
    pub peripheral_id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default = "unit_scale")]
    pub position_scale: f64,
    #[serde(default = "unit_scale")]
    pub velocity_scale: f64,
    #[serde(default = "unit_scale")]
    pub acceleration_scale: f64,
    #[serde(default = "unit_scale")]
    pub force_scale: f64,
    #[serde(default)]
    pub motion_type: MotionType,
    #[serde(default)]
    pub resolution_dependent: bool,
}

impl PeripheralRecord {
    /// Stand-in for an id the catalog does not know. Id 0 stands for the
    /// device's own axis and stays nameless.
    pub fn placeholder(peripheral_id: u32) -> Self {
        let name = match peripheral_id {
            0 => String::new(),
            id => format!("Peripheral {}", id),
        };
        PeripheralRecord {
            peripheral_id,
            name,
            position_scale: 1.0,
            velocity_scale: 1.0,
            acceleration_scale: 1.0,
            force_scale: 1.0,
            motion_type: MotionType::None,
            resolution_dependent: false,
        }
    }

    /// The converter described by this record, before resolution is known.
    pub fn converter(&self) -> UnitConverter {
        UnitConverter::new(
            self.position_scale,
            self.velocity_scale,
            self.acceleration_scale,
            self.force_scale,
            self.resolution_dependent,
        )
    }
}

/// Properties of one device type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceRecord {
    pub device_id: u32,
    pub name: String,
    #[serde(default, rename = "peripheral")]
    pub peripherals: Vec<PeripheralRecord>,
}

impl DeviceRecord {
    /// Stand-in for an id the catalog does not know.
    pub fn placeholder(device_id: u32) -> Self {
        DeviceRecord {
            device_id,
            name: format!("Device {}", device_id),
            peripherals: Vec::new(),
        }
    }
}

/// A source of device and peripheral records.
///
/// Only [`find_device`](DeviceCatalog::find_device) has to be provided; the
/// rest have defaults that work from the records themselves.
pub trait DeviceCatalog {
    /// Looks up a device type, synthesizing a placeholder for unknown ids.
    fn find_device(&self, device_id: u32) -> Cow<'_, DeviceRecord>;

    /// Looks up one of a device's peripherals, synthesizing a placeholder for unknown ids.
    fn find_peripheral<'a>(&self, device: &'a DeviceRecord, peripheral_id: u32) -> Cow<'a, PeripheralRecord> {
        match device.peripherals.iter().find(|p| p.peripheral_id == peripheral_id) {
            Some(record) => Cow::Borrowed(record),
            None => Cow::Owned(PeripheralRecord::placeholder(peripheral_id)),
        }
    }

    /// The display name of a device, or of a device with a peripheral attached.
    fn device_name(&self, device: &DeviceRecord, peripheral: Option<&PeripheralRecord>) -> String {
        match peripheral {
            Some(p) if !p.name.is_empty() => format!("{} + {}", device.name, p.name),
            _ => device.name.clone(),
        }
    }

    /// The motion type of an axis and, when it has physical units, its converter.
    fn motion_type_and_units(
        &self,
        _device: &DeviceRecord,
        peripheral: &PeripheralRecord,
    ) -> (MotionType, Option<UnitConverter>) {
        let units = if peripheral.motion_type.has_units() {
            Some(peripheral.converter())
        } else {
            None
        };
        (peripheral.motion_type, units)
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    device: Vec<DeviceRecord>,
}

/// An in-memory catalog keyed by device id.
///
/// Tables are written in TOML:
///
/// ```toml
/// [[device]]
/// device_id = 30341
/// name = "X-MCB2"
///
/// [[device.peripheral]]
/// peripheral_id = 43211
/// name = "LSQ150B-T4"
/// position_scale = 4.92126e6
/// motion_type = "linear"
/// resolution_dependent = true
/// ```
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    devices: HashMap<u32, DeviceRecord>,
}

impl TableCatalog {
    pub fn from_records(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        TableCatalog {
            devices: records.into_iter().map(|r| (r.device_id, r)).collect(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, LoadError> {
        let file: CatalogFile = toml::from_str(text)?;
        Ok(Self::from_records(file.device))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl DeviceCatalog for TableCatalog {
    fn find_device(&self, device_id: u32) -> Cow<'_, DeviceRecord> {
        match self.devices.get(&device_id) {
            Some(record) => Cow::Borrowed(record),
            None => Cow::Owned(DeviceRecord::placeholder(device_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
        [[device]]
        device_id = 30341
        name = "X-MCB2"

        [[device.peripheral]]
        peripheral_id = 43211
        name = "LSQ150B-T4"
        position_scale = 1000.0
        motion_type = "linear"
        resolution_dependent = true

        [[device]]
        device_id = 50081
        name = "X-RSW60A"

        [[device.peripheral]]
        peripheral_id = 0
        position_scale = 12.5
        force_scale = 3.0
        motion_type = "rotary"
    "#;

    #[test]
    fn loads_devices_from_toml() {
        let catalog = TableCatalog::from_toml_str(TABLE).unwrap();
        assert_eq!(catalog.len(), 2);

        let controller = catalog.find_device(30341);
        assert_eq!(controller.name, "X-MCB2");

        let stage = catalog.find_peripheral(&controller, 43211);
        assert_eq!(stage.motion_type, MotionType::Linear);
        assert_eq!(stage.velocity_scale, 1.0);
        assert_eq!(catalog.device_name(&controller, Some(&stage)), "X-MCB2 + LSQ150B-T4");
    }

    #[test]
    fn integrated_device_uses_peripheral_zero() {
        let catalog = TableCatalog::from_toml_str(TABLE).unwrap();
        let device = catalog.find_device(50081);
        let axis = catalog.find_peripheral(&device, 0);

        assert_eq!(catalog.device_name(&device, Some(&axis)), "X-RSW60A");
        let (motion, units) = catalog.motion_type_and_units(&device, &axis);
        assert_eq!(motion, MotionType::Rotary);
        assert_eq!(units.unwrap().force_to_native(2.0), 6);
    }

    #[test]
    fn unknown_ids_get_placeholders() {
        let catalog = TableCatalog::default();
        let device = catalog.find_device(1234);
        assert_eq!(device.name, "Device 1234");

        let peripheral = catalog.find_peripheral(&device, 77);
        assert_eq!(peripheral.name, "Peripheral 77");
        assert_eq!(catalog.device_name(&device, Some(&peripheral)), "Device 1234 + Peripheral 77");

        let (motion, units) = catalog.motion_type_and_units(&device, &peripheral);
        assert_eq!(motion, MotionType::None);
        assert!(units.is_none());

        let own_axis = catalog.find_peripheral(&device, 0);
        assert_eq!(catalog.device_name(&device, Some(&own_axis)), "Device 1234");
    }

    #[test]
    fn motion_types_may_be_numeric_codes() {
        let table = r#"
            [[device]]
            device_id = 1
            name = "A"

            [[device.peripheral]]
            peripheral_id = 0
            motion_type = 2

            [[device]]
            device_id = 2
            name = "B"

            [[device.peripheral]]
            peripheral_id = 0
            motion_type = 9
        "#;
        let catalog = TableCatalog::from_toml_str(table).unwrap();

        let rotary = catalog.find_device(1);
        assert_eq!(catalog.find_peripheral(&rotary, 0).motion_type, MotionType::Rotary);
        let other = catalog.find_device(2);
        assert_eq!(catalog.find_peripheral(&other, 0).motion_type, MotionType::Other);

        assert!(TableCatalog::from_toml_str(
            "[[device]]\ndevice_id = 3\nname = \"C\"\n[[device.peripheral]]\nperipheral_id = 0\nmotion_type = \"sideways\""
        )
        .is_err());
    }

    #[test]
    fn malformed_table_is_an_error() {
        assert!(matches!(
            TableCatalog::from_toml_str("[[device]]\nname = 5"),
            Err(LoadError::Toml(_))
        ));
    }
}
