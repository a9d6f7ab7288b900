//! Name interning. Every identifier seen by the scanner is interned here so
//! the rest of the pipeline compares integer handles instead of strings.

use std::collections::HashMap;

/// An opaque handle for an interned identifier.
///
/// Two handles compare equal iff the strings they were interned from are
/// equal, by construction of [`NameTable::intern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

/// The reserved words of the circuit-definition language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Circuit,
    Devices,
    Connect,
    Monitor,
    End,
    Switch,
    Clock,
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Not,
    Dtype,
    On,
    Off,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("CIRCUIT", Keyword::Circuit),
    ("DEVICES", Keyword::Devices),
    ("CONNECT", Keyword::Connect),
    ("MONITOR", Keyword::Monitor),
    ("END", Keyword::End),
    ("SWITCH", Keyword::Switch),
    ("CLOCK", Keyword::Clock),
    ("AND", Keyword::And),
    ("NAND", Keyword::Nand),
    ("OR", Keyword::Or),
    ("NOR", Keyword::Nor),
    ("XOR", Keyword::Xor),
    ("NOT", Keyword::Not),
    ("DTYPE", Keyword::Dtype),
    ("ON", Keyword::On),
    ("OFF", Keyword::Off),
];

/// Bidirectional string <-> handle table. Keywords are interned up front so
/// their handles are stable for the lifetime of the table.
pub struct NameTable {
    strings: Vec<String>,
    handles: HashMap<String, Handle>,
    keywords: HashMap<Handle, Keyword>,
}

impl NameTable {
    /// Builds a fresh table with all keywords pre-interned.
    pub fn new() -> Self {
        let mut table = NameTable {
            strings: Vec::new(),
            handles: HashMap::new(),
            keywords: HashMap::new(),
        };
        for (text, kw) in KEYWORDS {
            let handle = table.intern(text);
            table.keywords.insert(handle, *kw);
        }
        table
    }

    /// Returns the handle for `text`, interning it if this is the first
    /// occurrence.
    pub fn intern(&mut self, text: &str) -> Handle {
        if let Some(&handle) = self.handles.get(text) {
            return handle;
        }
        let handle = Handle(self.strings.len() as u32);
        self.strings.push(text.to_string());
        self.handles.insert(text.to_string(), handle);
        handle
    }

    /// Returns the original text for a handle. Panics if the handle was not
    /// produced by this table.
    pub fn lookup(&self, handle: Handle) -> &str {
        &self.strings[handle.0 as usize]
    }

    /// Returns `Some(kind)` if `handle` denotes a reserved keyword.
    pub fn is_keyword(&self, handle: Handle) -> Option<Keyword> {
        self.keywords.get(&handle).copied()
    }

    /// Returns the handle already interned for `text`, without interning
    /// it if absent. Useful for introspection/tests once parsing is done.
    pub fn get(&self, text: &str) -> Option<Handle> {
        self.handles.get(text).copied()
    }

    /// Looks up the handle for a keyword by its surface spelling, used by
    /// the scanner to classify a scanned identifier in a single lookup.
    pub fn keyword_handle(&self, text: &str) -> Option<(Handle, Keyword)> {
        let handle = *self.handles.get(text)?;
        let kw = *self.keywords.get(&handle)?;
        Some((handle, kw))
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bijection() {
        let mut t = NameTable::new();
        let a = t.intern("foo");
        let b = t.intern("bar");
        let c = t.intern("foo");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(t.lookup(a), "foo");
        assert_eq!(t.lookup(b), "bar");
    }

    #[test]
    fn keywords_preinterned_and_classified() {
        let mut t = NameTable::new();
        let (handle, kw) = t.keyword_handle("CIRCUIT").unwrap();
        assert_eq!(kw, Keyword::Circuit);
        assert_eq!(t.is_keyword(handle), Some(Keyword::Circuit));

        let name = t.intern("A");
        assert_eq!(t.is_keyword(name), None);
    }

    #[test]
    fn on_off_are_keywords() {
        let mut t = NameTable::new();
        assert!(t.keyword_handle("ON").is_some());
        assert!(t.keyword_handle("OFF").is_some());
    }
}
