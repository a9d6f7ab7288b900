//! The network model: devices, pins, connections, and signal state.
//! Topology is fixed once the parser finishes building it; only signal
//! fields mutate as the simulation kernel steps.

use std::collections::HashMap;

use crate::names::{Handle, NameTable};

/// Opaque id for a device, indexing into `Network::devices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

/// Five-valued signal. `Rising`/`Falling` are transient, collapsing to
/// `High`/`Low` after one cycle; `Undefined` represents an input that has
/// not yet settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Low,
    High,
    Rising,
    Falling,
    Undefined,
}

impl Signal {
    pub fn settle(self) -> Signal {
        match self {
            Signal::Rising => Signal::High,
            Signal::Falling => Signal::Low,
            other => other,
        }
    }

    pub fn is_high(self) -> bool {
        matches!(self, Signal::High | Signal::Rising)
    }

    pub fn is_low(self) -> bool {
        matches!(self, Signal::Low | Signal::Falling)
    }
}

/// Variants of device behavior. Evaluation dispatches on this tag rather
/// than through a trait object hierarchy.
#[derive(Debug, Clone)]
pub enum DeviceKind {
    Switch { init: u8 },
    Clock { period: u32 },
    And { arity: u8 },
    Nand { arity: u8 },
    Or { arity: u8 },
    Nor { arity: u8 },
    Xor,
    Not,
    DType,
}

impl DeviceKind {
    pub fn is_gate(&self) -> bool {
        matches!(
            self,
            DeviceKind::And { .. }
                | DeviceKind::Nand { .. }
                | DeviceKind::Or { .. }
                | DeviceKind::Nor { .. }
                | DeviceKind::Xor
                | DeviceKind::Not
        )
    }

    /// Number of `I1..In` input pins this device expects, or `None` for
    /// devices with named (non-numbered) input pins.
    pub fn gate_arity(&self) -> Option<u8> {
        match self {
            DeviceKind::And { arity } | DeviceKind::Nand { arity } => Some(*arity),
            DeviceKind::Or { arity } | DeviceKind::Nor { arity } => Some(*arity),
            DeviceKind::Xor => Some(2),
            DeviceKind::Not => Some(1),
            _ => None,
        }
    }
}

/// A single input pin: at most one driver, set once during build.
#[derive(Debug, Clone)]
pub struct InputPin {
    pub driver: Option<(DeviceId, Handle)>,
    pub current: Signal,
}

impl Default for InputPin {
    fn default() -> Self {
        InputPin {
            driver: None,
            current: Signal::Undefined,
        }
    }
}

/// A device instance: a kind tag plus its input and output pin state.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub name: Handle,
    pub kind: DeviceKind,
    pub inputs: HashMap<Handle, InputPin>,
    pub outputs: HashMap<Handle, Signal>,
    /// Half-cycle counter for `Clock` devices; unused otherwise.
    pub clock_counter: u32,
}

/// The default (unnamed) output slot used by `Switch`, `Clock`, and gates.
pub const DEFAULT_OUTPUT: &str = "$default";

/// A directed edge from an output pin to an input pin, recorded for
/// introspection; the actual driver link lives on the `InputPin`.
#[derive(Debug, Clone, Copy)]
pub struct Connection {
    pub src_device: DeviceId,
    pub src_output: Handle,
    pub dst_device: DeviceId,
    pub dst_input: Handle,
}

/// A point the simulation samples on every step.
#[derive(Debug, Clone)]
pub struct MonitorPoint {
    pub device: DeviceId,
    pub output: Handle,
    pub display_name: String,
    pub trace: Vec<Signal>,
}

/// The built, simulable network. A flat graph of devices and pins addressed
/// by id, rather than nested or cyclically-owned objects.
pub struct Network {
    pub(crate) names: NameTable,
    pub(crate) devices: Vec<Device>,
    pub(crate) name_to_device: HashMap<Handle, DeviceId>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) monitors: Vec<MonitorPoint>,
    pub(crate) default_output: Handle,
    /// Captured at build time so `reset()` can restore exact initial state.
    pub(crate) initial_devices: Vec<Device>,
}

impl Network {
    pub fn new(names: NameTable, default_output: Handle) -> Self {
        Network {
            names,
            devices: Vec::new(),
            name_to_device: HashMap::new(),
            connections: Vec::new(),
            monitors: Vec::new(),
            default_output,
            initial_devices: Vec::new(),
        }
    }

    pub fn device_by_name(&self, name: Handle) -> Option<DeviceId> {
        self.name_to_device.get(&name).copied()
    }

    /// Resolves a device by its textual name, for front-end-facing APIs
    /// that only know device names as strings.
    pub fn device_id_for(&self, name: &str) -> Option<DeviceId> {
        self.devices
            .iter()
            .find(|d| self.names.lookup(d.name) == name)
            .map(|d| d.id)
    }

    pub fn device(&self, id: DeviceId) -> &Device {
        &self.devices[id.0]
    }

    pub fn device_mut(&mut self, id: DeviceId) -> &mut Device {
        &mut self.devices[id.0]
    }

    pub fn devices_by_id(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn set_driver(&mut self, dst: DeviceId, input: Handle, driver: (DeviceId, Handle)) {
        self.devices[dst.0]
            .inputs
            .entry(input)
            .or_default()
            .driver = Some(driver);
    }

    pub fn driver_of(&self, dst: DeviceId, input: Handle) -> Option<(DeviceId, Handle)> {
        self.devices[dst.0].inputs.get(&input).and_then(|p| p.driver)
    }

    pub fn signal_at(&self, device: DeviceId, output: Handle) -> Signal {
        *self.devices[device.0]
            .outputs
            .get(&output)
            .unwrap_or(&Signal::Undefined)
    }

    pub fn set_signal(&mut self, device: DeviceId, output: Handle, signal: Signal) {
        self.devices[device.0].outputs.insert(output, signal);
    }

    pub fn monitors(&self) -> impl Iterator<Item = (&str, &[Signal])> {
        self.monitors
            .iter()
            .map(|m| (m.display_name.as_str(), m.trace.as_slice()))
    }

    /// Snapshot the just-built topology as the initial state so `reset()`
    /// can restore it byte-for-byte later.
    pub(crate) fn snapshot_initial(&mut self) {
        self.initial_devices = self.devices.clone();
    }

    /// Restores every device to its build-time initial state and clears all
    /// monitor traces. Topology (devices, connections) is never touched.
    pub fn reset(&mut self) {
        self.devices = self.initial_devices.clone();
        for m in &mut self.monitors {
            m.trace.clear();
        }
    }
}
