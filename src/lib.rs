//! A digital-logic circuit simulator: a custom lexer and LL(1) parser
//! build an in-memory network of switches, clocks, logic gates, and
//! D-type flip-flops from a small circuit-definition language, and a
//! simulation kernel advances that network one abstract cycle at a time,
//! sampling monitor points into a trace on every step.
//!
//! The crate is a pure core: graphical and command-line front-ends,
//! file dialogs, localisation, and trace plotting are all external
//! collaborators that consume [`Network`], [`Diagnostics`], and the
//! `step`/`monitors` API below.

pub mod diagnostics;
pub mod names;
pub mod network;
pub mod parser;
pub mod scanner;
pub mod simulation;
pub mod token;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use names::{Handle, Keyword, NameTable};
pub use network::{Connection, Device, DeviceId, DeviceKind, MonitorPoint, Network, Signal};
pub use parser::parse;
pub use simulation::{OscillationError, SimConfig, SimError};

#[cfg(test)]
mod tests {
    use super::*;

    fn build(src: &str) -> Network {
        // Safe to call from every test: `try_init` is a no-op once a
        // logger is already installed, and failures (e.g. a second
        // backend already registered) are deliberately ignored here.
        let _ = env_logger::builder().is_test(true).try_init();
        let (net, diags) = parse(src);
        assert!(!diags.has_errors(), "{}", diags.render_all(src));
        net
    }

    /// XOR is a strict two-input gate: high iff exactly one input is high.
    #[test]
    fn xor_truth_table() {
        let src = "CIRCUIT { DEVICES { A,B = SWITCH(0); X = XOR; } \
                   CONNECT { A > X.I1; B > X.I2; } \
                   MONITOR { X; } } END";

        let mut expected = Vec::new();
        for (a, b) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let mut net = build(src);
            net.set_switch("A", a).unwrap();
            net.set_switch("B", b).unwrap();
            net.step().unwrap();
            let (_, trace) = net.monitors().next().unwrap();
            expected.push(trace[0]);
        }
        assert_eq!(
            expected,
            vec![Signal::Low, Signal::High, Signal::High, Signal::Low]
        );
    }

    /// Clock-period law: a CLOCK(p) holds Low, then High, for p steps each.
    #[test]
    fn clock_period_law() {
        let src = "CIRCUIT { DEVICES { CL1 = CLOCK(2); } \
                   CONNECT { } MONITOR { CL1; } } END";
        let mut net = build(src);
        let mut trace = Vec::new();
        for _ in 0..6 {
            net.step().unwrap();
        }
        for (_, t) in net.monitors() {
            trace = t.to_vec();
        }
        assert_eq!(
            trace,
            vec![
                Signal::Low,
                Signal::Low,
                Signal::High,
                Signal::High,
                Signal::Low,
                Signal::Low,
            ]
        );
    }

    /// A D-type samples DATA on CLK's rising edge and holds that value
    /// until the next rising edge.
    #[test]
    fn dtype_latches_on_rising_edge() {
        let src = "CIRCUIT { DEVICES { D = SWITCH(1); CL = CLOCK(1); dt1 = DTYPE; } \
                   CONNECT { D > dt1.DATA; CL > dt1.CLK; } \
                   MONITOR { dt1.Q; } } END";
        let mut net = build(src);

        net.step().unwrap(); // CLOCK(1) step 1: still Low, no edge yet
        net.step().unwrap(); // step 2: Low -> Rising, dt1 samples DATA=1
        let q_after_first_edge = net.monitors().next().unwrap().1[1];
        assert_eq!(q_after_first_edge, Signal::High);

        net.set_switch("D", 0).unwrap();
        net.step().unwrap(); // step 3: High -> Falling, Q must hold High
        let q_after_fall = net.monitors().next().unwrap().1[2];
        assert_eq!(q_after_fall, Signal::High);
    }

    /// An unknown device reference is a single diagnostic; other
    /// connections in the same block still install.
    #[test]
    fn unknown_device_is_single_diagnostic() {
        let src = "CIRCUIT { DEVICES { A = SWITCH(0); X = XOR; } \
                   CONNECT { A > X.I1; FOO > X.I2; } \
                   MONITOR { X; } } END";
        let (net, diags) = parse(src);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.iter().next().unwrap().kind, DiagnosticKind::Semantic);
        let x = net.device_id_for("X").unwrap();
        let a = net.device_id_for("A").unwrap();
        let i1 = net.names.get("I1").unwrap();
        assert_eq!(net.driver_of(x, i1), Some((a, net.default_output)));
    }

    /// A second driver for the same input pin is exactly one diagnostic.
    #[test]
    fn multiple_drivers_single_diagnostic() {
        let src = "CIRCUIT { DEVICES { A,B = SWITCH(0); G = AND(1); } \
                   CONNECT { A > G.I1; B > G.I1; } \
                   MONITOR { G; } } END";
        let (_net, diags) = parse(src);
        assert_eq!(diags.len(), 1);
    }

    /// When propagation cannot reach a fixed point within the configured
    /// pass bound, `step` reports `OscillationError` instead of silently
    /// returning a half-settled network.
    #[test]
    fn oscillation_is_detected_when_bound_is_exhausted() {
        let src = "CIRCUIT { DEVICES { G = NAND(1); } \
                   CONNECT { G > G.I1; } \
                   MONITOR { G; } } END";
        let mut net = build(src);
        let config = SimConfig {
            max_propagation_passes: Some(0),
        };
        let result = net.step_with_config(&config);
        assert!(result.is_err());
    }

    /// KNOWN DEVIATION: a NAND fed back into only itself is sometimes
    /// expected to oscillate forever, since real hardware with an
    /// unbroken combinational feedback path never settles. Under this
    /// five-valued signal lattice that expectation does not hold: gate
    /// outputs seed as `Undefined`, `Undefined` is absorbing for a
    /// single-input NAND, and propagation reaches that absorbing fixed
    /// point on the very first pass, so `step` succeeds under the default
    /// bound instead of erroring. See DESIGN.md for the full writeup;
    /// this test pins down the actual (converging) behavior so a
    /// regression toward "also converges, but for the wrong reason"
    /// would still be caught.
    #[test]
    fn self_referencing_gate_converges_under_the_default_bound() {
        let src = "CIRCUIT { DEVICES { G = NAND(1); } \
                   CONNECT { G > G.I1; } \
                   MONITOR { G; } } END";
        let mut net = build(src);
        assert!(net.step().is_ok());
    }

    /// Reset idempotence: replaying the same switch/step sequence after
    /// `reset()` produces identical traces.
    #[test]
    fn reset_is_idempotent() {
        let src = "CIRCUIT { DEVICES { A,B = SWITCH(0); X = XOR; } \
                   CONNECT { A > X.I1; B > X.I2; } \
                   MONITOR { X; } } END";
        let mut net = build(src);

        net.set_switch("A", 1).unwrap();
        net.step().unwrap();
        net.set_switch("B", 1).unwrap();
        net.step().unwrap();
        let first_run: Vec<Signal> = net.monitors().next().unwrap().1.to_vec();

        net.reset();
        net.set_switch("A", 1).unwrap();
        net.step().unwrap();
        net.set_switch("B", 1).unwrap();
        net.step().unwrap();
        let second_run: Vec<Signal> = net.monitors().next().unwrap().1.to_vec();

        assert_eq!(first_run, second_run);
    }

    /// Determinism: two independently parsed, independently stepped runs
    /// of the same source produce identical traces.
    #[test]
    fn determinism_across_independent_runs() {
        let src = "CIRCUIT { DEVICES { A = SWITCH(1); CL = CLOCK(1); dt1 = DTYPE; } \
                   CONNECT { A > dt1.DATA; CL > dt1.CLK; } \
                   MONITOR { dt1.Q; dt1.QBAR; } } END";
        let mut net1 = build(src);
        let mut net2 = build(src);
        for _ in 0..5 {
            net1.step().unwrap();
            net2.step().unwrap();
        }
        let traces1: Vec<_> = net1.monitors().map(|(_, t)| t.to_vec()).collect();
        let traces2: Vec<_> = net2.monitors().map(|(_, t)| t.to_vec()).collect();
        assert_eq!(traces1, traces2);
    }

    /// Parse totality: the parser terminates and returns a diagnostics
    /// list for arbitrary, badly malformed input, instead of panicking
    /// or looping.
    #[test]
    fn parse_totality_on_malformed_input() {
        let (_net, diags) = parse("CIRCUIT { DEVICES { ; ; ; } garbage END");
        assert!(diags.has_errors());
    }
}
