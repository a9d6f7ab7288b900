//! Recursive-descent parser and network builder. One routine per grammar
//! non-terminal; each production both recognizes the grammar and, on
//! success, mutates the network under construction. Errors are collected
//! as diagnostics and the parser recovers to a stopping symbol rather
//! than aborting.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::names::{Handle, Keyword, NameTable};
use crate::network::{
    Connection, Device, DeviceId, DeviceKind, InputPin, MonitorPoint, Network, Signal,
    DEFAULT_OUTPUT,
};
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};

/// Parses a complete circuit-definition source file and builds the
/// network incrementally. Always returns a network (which may be
/// partially built) and the diagnostics collected along the way.
/// Simulation should refuse to run unless `diagnostics.has_errors()` is
/// false.
pub fn parse(source: &str) -> (Network, Diagnostics) {
    let mut names = NameTable::new();
    let default_output = names.intern(DEFAULT_OUTPUT);
    let network = Network::new(names, default_output);

    let mut parser = Parser::new(source, network);
    parser.parse_network();
    let mut network = parser.network;
    let diags = parser.diags;

    if !diags.has_errors() {
        network.snapshot_initial();
    }
    (network, diags)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

struct ParsedPoint {
    device_tok: Token,
    device_name: Handle,
    pin_tok: Option<Token>,
    pin_name: Option<Handle>,
}

struct Parser<'a> {
    scanner: Scanner<'a>,
    network: Network,
    diags: Diagnostics,
    current: Token,
    data: Handle,
    clk: Handle,
    set: Handle,
    clear: Handle,
    q: Handle,
    qbar: Handle,
    device_defined_at: HashMap<Handle, (u32, u32)>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, mut network: Network) -> Self {
        let mut scanner = Scanner::new(source);
        let mut diags = Diagnostics::new();
        let current = scanner.next_token(&mut network.names, &mut diags);
        let data = network.names.intern("DATA");
        let clk = network.names.intern("CLK");
        let set = network.names.intern("SET");
        let clear = network.names.intern("CLEAR");
        let q = network.names.intern("Q");
        let qbar = network.names.intern("QBAR");
        Parser {
            scanner,
            network,
            diags,
            current,
            data,
            clk,
            set,
            clear,
            q,
            qbar,
            device_defined_at: HashMap::new(),
        }
    }

    fn advance(&mut self) -> Token {
        let next = self
            .scanner
            .next_token(&mut self.network.names, &mut self.diags);
        std::mem::replace(&mut self.current, next)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.current.kind, TokenKind::Keyword(k) if k == kw)
    }

    /// Consumes the current token if it matches `kind`, else records a
    /// syntax error and leaves the token stream untouched.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.current.kind == kind {
            Some(self.advance())
        } else {
            self.error_unexpected(what);
            None
        }
    }

    fn error_unexpected(&mut self, expected: &str) {
        self.diags.push(Diagnostic::syntax(
            format!("expected {}, found {}", expected, describe(self.current.kind)),
            self.current.line,
            self.current.col,
        ));
    }

    /// Skips tokens until one matching `stops` (or EOF) is the current
    /// token. Stopping sets are fixed constants per non-terminal.
    fn recover(&mut self, stops: &[TokenKind]) {
        while !stops.contains(&self.current.kind) && !self.at(TokenKind::Eof) {
            self.advance();
        }
    }

    // network = "CIRCUIT" "{" devices connections monitors "}" "END"
    fn parse_network(&mut self) {
        if self.expect(TokenKind::Keyword(Keyword::Circuit), "'CIRCUIT'").is_none() {
            self.recover(&[TokenKind::LBrace]);
        }
        if self.expect(TokenKind::LBrace, "'{'").is_none() {
            self.recover(&[TokenKind::Keyword(Keyword::Devices), TokenKind::RBrace]);
        }

        if self.at_keyword(Keyword::Devices) {
            self.parse_devices();
        } else {
            self.error_unexpected("'DEVICES'");
        }

        if self.at_keyword(Keyword::Connect) {
            self.parse_connections();
        } else {
            self.error_unexpected("'CONNECT'");
        }

        if self.at_keyword(Keyword::Monitor) {
            self.parse_monitors();
        } else {
            self.diags.push(Diagnostic::syntax(
                "missing MONITOR block: at least one monitor point is required",
                self.current.line,
                self.current.col,
            ));
        }

        self.check_unconnected_inputs();

        if self.expect(TokenKind::RBrace, "'}'").is_none() {
            self.recover(&[TokenKind::Keyword(Keyword::End), TokenKind::Eof]);
        }
        self.expect(TokenKind::Keyword(Keyword::End), "'END'");
    }

    // devices = "DEVICES" "{" device { device } "}"
    fn parse_devices(&mut self) {
        self.advance(); // DEVICES
        if self.expect(TokenKind::LBrace, "'{'").is_none() {
            self.recover(&[TokenKind::RBrace]);
        }
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Keyword(Keyword::Connect)) {
                break;
            }
            self.parse_device();
        }
        self.expect(TokenKind::RBrace, "'}'");
    }

    // device = name { "," name } "=" devspec ";"
    fn parse_device(&mut self) {
        const STOP: &[TokenKind] = &[TokenKind::Semicolon, TokenKind::RBrace];

        let mut names = Vec::new();
        match self.expect_name("device name") {
            Some((tok, handle)) => names.push((tok, handle)),
            None => {
                self.recover(STOP);
                if self.at(TokenKind::Semicolon) {
                    self.advance();
                }
                return;
            }
        }
        while self.at(TokenKind::Comma) {
            self.advance();
            if let Some((tok, handle)) = self.expect_name("device name") {
                names.push((tok, handle));
            } else {
                self.recover(STOP);
                if self.at(TokenKind::Semicolon) {
                    self.advance();
                }
                return;
            }
        }

        if self.expect(TokenKind::Equals, "'='").is_none() {
            self.recover(STOP);
            if self.at(TokenKind::Semicolon) {
                self.advance();
            }
            return;
        }

        let kind = match self.parse_devspec() {
            Some(kind) => kind,
            None => {
                self.recover(STOP);
                if self.at(TokenKind::Semicolon) {
                    self.advance();
                }
                return;
            }
        };

        if self.expect(TokenKind::Semicolon, "';'").is_none() {
            self.recover(STOP);
            if self.at(TokenKind::Semicolon) {
                self.advance();
            }
        }

        for (tok, handle) in names {
            self.install_device(handle, kind.clone(), tok.line, tok.col);
        }
    }

    fn expect_name(&mut self, what: &str) -> Option<(Token, Handle)> {
        if self.at(TokenKind::Name) {
            let tok = self.advance();
            let handle = tok.name.unwrap();
            // The scanner classifies keyword spellings before they ever
            // become a `Name` token, so this can't actually trigger today;
            // kept as a direct guard against a reserved word being used
            // where an identifier is expected, in case that invariant ever
            // moves into the parser instead.
            if self.network.names.is_keyword(handle).is_some() {
                self.diags.push(Diagnostic::semantic(
                    format!(
                        "'{}' is a reserved word and cannot be used as a name",
                        self.network.names.lookup(handle)
                    ),
                    tok.line,
                    tok.col,
                ));
                return None;
            }
            Some((tok, handle))
        } else {
            self.error_unexpected(what);
            None
        }
    }

    fn parse_devspec(&mut self) -> Option<DeviceKind> {
        match self.current.kind {
            TokenKind::Keyword(Keyword::Switch) => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let init = self.parse_switch_level()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(DeviceKind::Switch { init })
            }
            TokenKind::Keyword(Keyword::Clock) => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let (tok, period) = self.expect_number("clock period")?;
                if period == 0 {
                    self.diags.push(Diagnostic::semantic(
                        "CLOCK period must be >= 1",
                        tok.line,
                        tok.col,
                    ));
                }
                self.expect(TokenKind::RParen, "')'")?;
                Some(DeviceKind::Clock { period: period.max(1) })
            }
            TokenKind::Keyword(kw @ (Keyword::And | Keyword::Nand | Keyword::Or | Keyword::Nor)) => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let (tok, n) = self.expect_number("gate arity")?;
                if n < 1 || n > 16 {
                    self.diags.push(Diagnostic::semantic(
                        format!("gate arity must be in [1,16], got {}", n),
                        tok.line,
                        tok.col,
                    ));
                }
                self.expect(TokenKind::RParen, "')'")?;
                let arity = n.clamp(1, 16) as u8;
                Some(match kw {
                    Keyword::And => DeviceKind::And { arity },
                    Keyword::Nand => DeviceKind::Nand { arity },
                    Keyword::Or => DeviceKind::Or { arity },
                    Keyword::Nor => DeviceKind::Nor { arity },
                    _ => unreachable!(),
                })
            }
            TokenKind::Keyword(Keyword::Xor) => {
                self.advance();
                Some(DeviceKind::Xor)
            }
            TokenKind::Keyword(Keyword::Not) => {
                self.advance();
                Some(DeviceKind::Not)
            }
            TokenKind::Keyword(Keyword::Dtype) => {
                self.advance();
                Some(DeviceKind::DType)
            }
            _ => {
                self.error_unexpected("a device specification");
                None
            }
        }
    }

    fn parse_switch_level(&mut self) -> Option<u8> {
        match self.current.kind {
            TokenKind::Number => {
                let tok = self.advance();
                let n = tok.number.unwrap();
                if n > 1 {
                    self.diags.push(Diagnostic::semantic(
                        format!("SWITCH initial level must be 0 or 1, got {}", n),
                        tok.line,
                        tok.col,
                    ));
                    Some(0)
                } else {
                    Some(n as u8)
                }
            }
            TokenKind::Keyword(Keyword::On) => {
                self.advance();
                Some(1)
            }
            TokenKind::Keyword(Keyword::Off) => {
                self.advance();
                Some(0)
            }
            _ => {
                self.error_unexpected("'0', '1', 'ON', or 'OFF'");
                None
            }
        }
    }

    fn expect_number(&mut self, what: &str) -> Option<(Token, u32)> {
        if self.at(TokenKind::Number) {
            let tok = self.advance();
            Some((tok, tok.number.unwrap()))
        } else {
            self.error_unexpected(what);
            None
        }
    }

    fn install_device(&mut self, name: Handle, kind: DeviceKind, line: u32, col: u32) {
        if self.network.device_by_name(name).is_some() {
            self.diags.push(Diagnostic::semantic(
                format!("duplicate device name '{}'", self.network.names.lookup(name)),
                line,
                col,
            ));
            return;
        }

        let id = DeviceId(self.network.devices.len());
        let mut inputs = HashMap::new();
        let mut outputs = HashMap::new();
        let default_output = self.network.default_output;

        match &kind {
            DeviceKind::Switch { init } => {
                let sig = if *init == 1 { Signal::High } else { Signal::Low };
                outputs.insert(default_output, sig);
            }
            DeviceKind::Clock { .. } => {
                outputs.insert(default_output, Signal::Low);
            }
            DeviceKind::DType => {
                inputs.insert(self.data, InputPin::default());
                inputs.insert(self.clk, InputPin::default());
                inputs.insert(self.set, InputPin::default());
                inputs.insert(self.clear, InputPin::default());
                outputs.insert(self.q, Signal::Low);
                outputs.insert(self.qbar, Signal::High);
            }
            _ => {
                if let Some(arity) = kind.gate_arity() {
                    for i in 1..=arity {
                        let handle = self.network.names.intern(&format!("I{}", i));
                        inputs.insert(handle, InputPin::default());
                    }
                }
                outputs.insert(default_output, Signal::Undefined);
            }
        }

        let device = Device {
            id,
            name,
            kind,
            inputs,
            outputs,
            clock_counter: 0,
        };
        self.network.devices.push(device);
        self.network.name_to_device.insert(name, id);
        self.device_defined_at.insert(name, (line, col));
    }

    // connections = "CONNECT" "{" con { con } "}"
    fn parse_connections(&mut self) {
        self.advance(); // CONNECT
        if self.expect(TokenKind::LBrace, "'{'").is_none() {
            self.recover(&[TokenKind::RBrace]);
        }
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Keyword(Keyword::Monitor)) {
                break;
            }
            self.parse_connection();
        }
        self.expect(TokenKind::RBrace, "'}'");
    }

    // con = point ">" point { "," point } ";"
    fn parse_connection(&mut self) {
        const STOP: &[TokenKind] = &[TokenKind::Semicolon, TokenKind::RBrace];

        let src = match self.parse_point() {
            Some(p) => p,
            None => {
                self.recover(STOP);
                if self.at(TokenKind::Semicolon) {
                    self.advance();
                }
                return;
            }
        };

        if self.expect(TokenKind::Arrow, "'>'").is_none() {
            self.recover(STOP);
            if self.at(TokenKind::Semicolon) {
                self.advance();
            }
            return;
        }

        let mut dsts = Vec::new();
        match self.parse_point() {
            Some(p) => dsts.push(p),
            None => {
                self.recover(STOP);
                if self.at(TokenKind::Semicolon) {
                    self.advance();
                }
                return;
            }
        }
        while self.at(TokenKind::Comma) {
            self.advance();
            match self.parse_point() {
                Some(p) => dsts.push(p),
                None => {
                    self.recover(STOP);
                    if self.at(TokenKind::Semicolon) {
                        self.advance();
                    }
                    return;
                }
            }
        }

        if self.expect(TokenKind::Semicolon, "';'").is_none() {
            self.recover(STOP);
            if self.at(TokenKind::Semicolon) {
                self.advance();
            }
        }

        let resolved_src = self.resolve_point(&src, Direction::Output);
        for dst in &dsts {
            let resolved_dst = self.resolve_point(dst, Direction::Input);
            match (resolved_src, resolved_dst) {
                (Some((src_dev, src_pin)), Some((dst_dev, dst_pin))) => {
                    if self.network.driver_of(dst_dev, dst_pin).is_some() {
                        let (line, col) = dst.pin_tok.unwrap_or(dst.device_tok).line_col();
                        self.diags.push(Diagnostic::semantic(
                            "multiple drivers for the same input pin",
                            line,
                            col,
                        ));
                        continue;
                    }
                    self.network.set_driver(dst_dev, dst_pin, (src_dev, src_pin));
                    self.network.connections.push(Connection {
                        src_device: src_dev,
                        src_output: src_pin,
                        dst_device: dst_dev,
                        dst_input: dst_pin,
                    });
                }
                _ => {}
            }
        }
    }

    // point = name [ "." name ]
    fn parse_point(&mut self) -> Option<ParsedPoint> {
        let (device_tok, device_name) = self.expect_name("a device name")?;
        let mut pin_tok = None;
        let mut pin_name = None;
        if self.at(TokenKind::Dot) {
            self.advance();
            let (tok, handle) = self.expect_name("a pin name")?;
            pin_tok = Some(tok);
            pin_name = Some(handle);
        }
        Some(ParsedPoint {
            device_tok,
            device_name,
            pin_tok,
            pin_name,
        })
    }

    fn resolve_point(&mut self, point: &ParsedPoint, want: Direction) -> Option<(DeviceId, Handle)> {
        let device_id = match self.network.device_by_name(point.device_name) {
            Some(id) => id,
            None => {
                self.diags.push(Diagnostic::semantic(
                    format!(
                        "unknown device '{}'",
                        self.network.names.lookup(point.device_name)
                    ),
                    point.device_tok.line,
                    point.device_tok.col,
                ));
                return None;
            }
        };

        let (line, col) = point
            .pin_tok
            .map(|t| (t.line, t.col))
            .unwrap_or((point.device_tok.line, point.device_tok.col));

        let kind = self.network.device(device_id).kind.clone();
        let classified = self.classify_pin(&kind, point.pin_name);
        match classified {
            None => {
                self.diags.push(Diagnostic::semantic(
                    "unknown pin",
                    line,
                    col,
                ));
                None
            }
            Some((pin_handle, actual_dir)) => {
                if actual_dir != want {
                    let expected = match want {
                        Direction::Output => "an output pin",
                        Direction::Input => "an input pin",
                    };
                    self.diags.push(Diagnostic::semantic(
                        format!("expected {}", expected),
                        line,
                        col,
                    ));
                    None
                } else {
                    Some((device_id, pin_handle))
                }
            }
        }
    }

    /// Classifies `pin` (or the default output, if `None`) against `kind`,
    /// returning the resolved pin handle and whether it is an input or
    /// output pin. Returns `None` if no such pin exists on this device
    /// kind.
    fn classify_pin(&self, kind: &DeviceKind, pin: Option<Handle>) -> Option<(Handle, Direction)> {
        match pin {
            None => match kind {
                DeviceKind::DType => None,
                _ => Some((self.network.default_output, Direction::Output)),
            },
            Some(name) => match kind {
                DeviceKind::DType => {
                    if name == self.data || name == self.clk || name == self.set || name == self.clear {
                        Some((name, Direction::Input))
                    } else if name == self.q || name == self.qbar {
                        Some((name, Direction::Output))
                    } else {
                        None
                    }
                }
                DeviceKind::Switch { .. } | DeviceKind::Clock { .. } => None,
                _ => {
                    let arity = kind.gate_arity()?;
                    let text = self.network.names.lookup(name);
                    for i in 1..=arity {
                        if text == format!("I{}", i) {
                            return Some((name, Direction::Input));
                        }
                    }
                    None
                }
            },
        }
    }

    // monitors = "MONITOR" "{" mon { mon } "}"
    fn parse_monitors(&mut self) {
        self.advance(); // MONITOR
        if self.expect(TokenKind::LBrace, "'{'").is_none() {
            self.recover(&[TokenKind::RBrace]);
        }
        let mut count = 0;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            self.parse_monitor();
            count += 1;
        }
        if count == 0 {
            self.diags.push(Diagnostic::syntax(
                "MONITOR block must contain at least one monitor point",
                self.current.line,
                self.current.col,
            ));
        }
        self.expect(TokenKind::RBrace, "'}'");
    }

    // mon = point ";"
    fn parse_monitor(&mut self) {
        const STOP: &[TokenKind] = &[TokenKind::Semicolon, TokenKind::RBrace];

        let point = match self.parse_point() {
            Some(p) => p,
            None => {
                self.recover(STOP);
                if self.at(TokenKind::Semicolon) {
                    self.advance();
                }
                return;
            }
        };
        if self.expect(TokenKind::Semicolon, "';'").is_none() {
            self.recover(STOP);
            if self.at(TokenKind::Semicolon) {
                self.advance();
            }
        }

        if let Some((device, output)) = self.resolve_point(&point, Direction::Output) {
            let display_name = match point.pin_name {
                Some(pin) => format!(
                    "{}.{}",
                    self.network.names.lookup(point.device_name),
                    self.network.names.lookup(pin)
                ),
                None => self.network.names.lookup(point.device_name).to_string(),
            };
            self.network.monitors.push(MonitorPoint {
                device,
                output,
                display_name,
                trace: Vec::new(),
            });
        }
    }

    /// Global check run once the whole network has been built: every
    /// input pin must have a driver.
    fn check_unconnected_inputs(&mut self) {
        let mut missing = Vec::new();
        for device in &self.network.devices {
            for (pin, input) in &device.inputs {
                if input.driver.is_none() {
                    missing.push((device.name, *pin));
                }
            }
        }
        for (device_name, pin) in missing {
            let (line, col) = self
                .device_defined_at
                .get(&device_name)
                .copied()
                .unwrap_or((1, 1));
            self.diags.push(Diagnostic::semantic(
                format!(
                    "input pin '{}.{}' has no driver",
                    self.network.names.lookup(device_name),
                    self.network.names.lookup(pin)
                ),
                line,
                col,
            ));
        }
    }
}

impl Token {
    fn line_col(&self) -> (u32, u32) {
        (self.line, self.col)
    }
}

fn describe(kind: TokenKind) -> String {
    match kind {
        TokenKind::Keyword(_) => "a keyword".to_string(),
        TokenKind::Name => "a name".to_string(),
        TokenKind::Number => "a number".to_string(),
        TokenKind::Equals => "'='".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Semicolon => "';'".to_string(),
        TokenKind::Arrow => "'>'".to_string(),
        TokenKind::Dot => "'.'".to_string(),
        TokenKind::LBrace => "'{'".to_string(),
        TokenKind::RBrace => "'}'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Eof => "end of file".to_string(),
        TokenKind::Invalid(c) => format!("invalid character '{}'", c),
    }
}
