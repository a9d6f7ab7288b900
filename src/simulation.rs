//! The simulation kernel: advance clocks, propagate to a fixed point,
//! update D-types, demote transient signals, and sample monitors.

use thiserror::Error;

use crate::network::{DeviceId, DeviceKind, Network, Signal, DEFAULT_OUTPUT};

/// Raised when propagation fails to reach a fixed point within the pass
/// bound. The network's signal state and monitor traces are left exactly
/// as they were before the failed step: a step is atomic, it never
/// leaves the network half-settled.
#[derive(Debug, Error)]
#[error("oscillation detected: network did not stabilize within {passes} passes")]
pub struct OscillationError {
    pub passes: usize,
}

/// Errors raised by the public simulation API that are not user source
/// errors (those become `Diagnostic`s instead).
#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown device '{0}'")]
    UnknownDevice(String),
    #[error("device '{0}' is not a switch")]
    NotASwitch(String),
    #[error("switch level must be 0 or 1, got {0}")]
    BadSwitchLevel(u8),
    #[error(transparent)]
    Oscillation(#[from] OscillationError),
}

/// Tunable bounds for the simulation kernel.
#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    /// Overrides the `N_DEV + 1` propagation-pass bound used to detect a
    /// network that never settles. `None` means use the default bound.
    pub max_propagation_passes: Option<usize>,
}

impl Network {
    /// Sets a switch's output level. Only valid for `Switch` devices.
    pub fn set_switch(&mut self, name: &str, level: u8) -> Result<(), SimError> {
        if level > 1 {
            return Err(SimError::BadSwitchLevel(level));
        }
        let id = self
            .device_id_for(name)
            .ok_or_else(|| SimError::UnknownDevice(name.to_string()))?;
        let out = self.default_output;
        match self.device(id).kind {
            DeviceKind::Switch { .. } => {
                let signal = if level == 1 { Signal::High } else { Signal::Low };
                self.set_signal(id, out, signal);
                Ok(())
            }
            _ => Err(SimError::NotASwitch(name.to_string())),
        }
    }

    /// Advances the network by one abstract cycle.
    pub fn step(&mut self) -> Result<(), OscillationError> {
        self.step_with_config(&SimConfig::default())
    }

    pub fn step_with_config(&mut self, config: &SimConfig) -> Result<(), OscillationError> {
        let before = self.devices.clone();

        self.advance_clocks();

        let bound = config
            .max_propagation_passes
            .unwrap_or(self.devices.len() + 1);
        if let Err(e) = self.propagate_to_fixed_point(bound) {
            self.devices = before;
            return Err(e);
        }

        self.demote_transients();
        self.sample_monitors();
        Ok(())
    }

    /// A `CLOCK(p)` holds each level for `p` steps before toggling.
    /// `clock_counter` tracks how many steps have been spent at the
    /// current level; hitting `period` toggles the level and this step
    /// becomes the first of the new one.
    fn advance_clocks(&mut self) {
        let out = self.default_output;
        for device in &mut self.devices {
            if let DeviceKind::Clock { period } = device.kind {
                if device.clock_counter >= period {
                    let current = *device.outputs.get(&out).unwrap_or(&Signal::Low);
                    let next = if current.is_high() {
                        Signal::Falling
                    } else {
                        Signal::Rising
                    };
                    device.outputs.insert(out, next);
                    device.clock_counter = 1;
                    log::trace!("clock {:?} toggled to {:?}", device.id, next);
                } else {
                    device.clock_counter += 1;
                }
            }
        }
    }

    fn propagate_to_fixed_point(&mut self, bound: usize) -> Result<(), OscillationError> {
        for pass in 0..bound {
            let mut changed = false;
            let ids: Vec<DeviceId> = self.devices.iter().map(|d| d.id).collect();
            for id in ids {
                if self.evaluate_device(id) {
                    changed = true;
                }
            }
            if !changed {
                log::debug!("network stabilized after {} pass(es)", pass + 1);
                return Ok(());
            }
        }
        log::warn!("oscillation: no fixed point within {} passes", bound);
        Err(OscillationError { passes: bound })
    }

    /// Re-derives `id`'s inputs from its drivers, evaluates it, and writes
    /// any changed outputs back. Returns whether anything changed.
    fn evaluate_device(&mut self, id: DeviceId) -> bool {
        let input_names: Vec<_> = self.device(id).inputs.keys().copied().collect();
        let mut resolved = Vec::with_capacity(input_names.len());
        for name in &input_names {
            let driver = self.device(id).inputs[name].driver;
            let value = match driver {
                Some((src_dev, src_out)) => self.signal_at(src_dev, src_out),
                None => Signal::Undefined,
            };
            resolved.push((*name, value));
        }
        for (name, value) in &resolved {
            self.device_mut(id).inputs.get_mut(name).unwrap().current = *value;
        }

        let kind = self.device(id).kind.clone();
        let mut changed = false;

        if kind.is_gate() {
            let result = evaluate_gate(&kind, &resolved);
            let out = self.default_output;
            if self.signal_at(id, out) != result {
                self.set_signal(id, out, result);
                changed = true;
            }
        } else if matches!(kind, DeviceKind::DType) {
            changed = self.evaluate_dtype(id);
        }
        // Switch and Clock outputs are set directly (set_switch / advance_clocks),
        // not recomputed here.
        changed
    }

    fn evaluate_dtype(&mut self, id: DeviceId) -> bool {
        let names = dtype_handles(self);
        let data = self.device(id).inputs[&names.data].current;
        let clk = self.device(id).inputs[&names.clk].current;
        let set = self.device(id).inputs[&names.set].current;
        let clear = self.device(id).inputs[&names.clear].current;

        let prev_q = self.signal_at(id, names.q);
        let prev_qbar = self.signal_at(id, names.qbar);

        let (q, qbar) = if clear.is_high() {
            (Signal::Low, Signal::High)
        } else if set.is_high() {
            (Signal::High, Signal::Low)
        } else if matches!(clk, Signal::Rising) {
            if data.is_high() {
                (Signal::High, Signal::Low)
            } else {
                (Signal::Low, Signal::High)
            }
        } else {
            (prev_q, prev_qbar)
        };

        let changed = q != prev_q || qbar != prev_qbar;
        self.set_signal(id, names.q, q);
        self.set_signal(id, names.qbar, qbar);
        changed
    }

    fn demote_transients(&mut self) {
        for device in &mut self.devices {
            for (_, input) in device.inputs.iter_mut() {
                input.current = input.current.settle();
            }
            for (_, out) in device.outputs.iter_mut() {
                *out = out.settle();
            }
        }
    }

    fn sample_monitors(&mut self) {
        for m in &mut self.monitors {
            let sig = self
                .devices
                .iter()
                .find(|d| d.id == m.device)
                .and_then(|d| d.outputs.get(&m.output))
                .copied()
                .unwrap_or(Signal::Undefined);
            m.trace.push(sig);
        }
    }
}

struct DTypeHandles {
    data: crate::names::Handle,
    clk: crate::names::Handle,
    set: crate::names::Handle,
    clear: crate::names::Handle,
    q: crate::names::Handle,
    qbar: crate::names::Handle,
}

/// D-type pin names are looked up (not pre-cached) since the table already
/// interns them once during parsing; repeating `intern` here just returns
/// the existing handle.
fn dtype_handles(network: &mut Network) -> DTypeHandles {
    DTypeHandles {
        data: network.names.intern("DATA"),
        clk: network.names.intern("CLK"),
        set: network.names.intern("SET"),
        clear: network.names.intern("CLEAR"),
        q: network.names.intern("Q"),
        qbar: network.names.intern("QBAR"),
    }
}

/// Evaluates a combinational gate given its resolved input signals.
fn evaluate_gate(kind: &DeviceKind, inputs: &[(crate::names::Handle, Signal)]) -> Signal {
    let values: Vec<Signal> = inputs.iter().map(|(_, s)| *s).collect();
    match kind {
        DeviceKind::And { .. } => and(&values),
        DeviceKind::Nand { .. } => negate(and(&values)),
        DeviceKind::Or { .. } => or(&values),
        DeviceKind::Nor { .. } => negate(or(&values)),
        DeviceKind::Xor => {
            if values.len() != 2 {
                return Signal::Undefined;
            }
            let (a, b) = (values[0], values[1]);
            if matches!(a, Signal::Undefined) || matches!(b, Signal::Undefined) {
                Signal::Undefined
            } else if a.is_high() != b.is_high() {
                Signal::High
            } else {
                Signal::Low
            }
        }
        DeviceKind::Not => match values.first() {
            Some(v) => negate(*v),
            None => Signal::Undefined,
        },
        _ => Signal::Undefined,
    }
}

fn and(values: &[Signal]) -> Signal {
    if values.iter().any(|v| v.is_low()) {
        Signal::Low
    } else if values.iter().all(|v| v.is_high()) {
        Signal::High
    } else {
        Signal::Undefined
    }
}

fn or(values: &[Signal]) -> Signal {
    if values.iter().any(|v| v.is_high()) {
        Signal::High
    } else if values.iter().all(|v| v.is_low()) {
        Signal::Low
    } else {
        Signal::Undefined
    }
}

fn negate(signal: Signal) -> Signal {
    match signal {
        Signal::High | Signal::Rising => Signal::Low,
        Signal::Low | Signal::Falling => Signal::High,
        Signal::Undefined => Signal::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_gate_follows_truth_table() {
        assert_eq!(and(&[Signal::High, Signal::High]), Signal::High);
        assert_eq!(and(&[Signal::High, Signal::Low]), Signal::Low);
        assert_eq!(and(&[Signal::High, Signal::Undefined]), Signal::Undefined);
    }

    #[test]
    fn or_gate_follows_truth_table() {
        assert_eq!(or(&[Signal::Low, Signal::Low]), Signal::Low);
        assert_eq!(or(&[Signal::High, Signal::Low]), Signal::High);
        assert_eq!(or(&[Signal::Undefined, Signal::Low]), Signal::Undefined);
    }

    #[test]
    fn not_inverts_single_input() {
        assert_eq!(negate(Signal::High), Signal::Low);
        assert_eq!(negate(Signal::Low), Signal::High);
    }

    #[test]
    fn gate_purity() {
        let a = and(&[Signal::High, Signal::Low]);
        let b = and(&[Signal::High, Signal::Low]);
        assert_eq!(a, b);
    }
}
