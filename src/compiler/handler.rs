//! Handler naming and the handler registry.
//!
//! Every instruction row is executed by a handler. Rows sharing a mnemonic
//! and operand width share a handler. The width suffix only becomes part of
//! the name when a mnemonic is used with more than one width across the
//! whole table, so `ADD` is split into `ADD_b` and `ADD_w`, while `DAA` stays
//! `DAA`.

use compiler::compile::CompileError;
use compiler::operand::{OperandSpecifier, Register};
use compiler::table::{OpcodeEntry, Table};
use compiler::width::{self, Suffix};

use std::collections::HashMap;
use std::slice;

/// Mnemonics of the segment override prefixes, in `sreg` encoding order.
pub const SEGMENT_OVERRIDES: [&str; 4] = ["ES:", "CS:", "SS:", "DS:"];

/// Mnemonics of the string repeat prefixes.
pub const REPEAT_PREFIXES: [&str; 5] = ["REP", "REPE", "REPZ", "REPNE", "REPNZ"];

pub const NOP: &str = "NOP";

/// Rust keywords, strict and reserved. Method names colliding with one get a
/// trailing underscore.
pub const RUST_KEYWORDS: [&str; 51] = [
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "try", "type", "typeof",
    "union", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

pub fn is_segment_override(mnemonic: &str) -> bool {
    SEGMENT_OVERRIDES.contains(&mnemonic)
}

pub fn is_repeat_prefix(mnemonic: &str) -> bool {
    REPEAT_PREFIXES.contains(&mnemonic)
}

/// Whether a missing implementation of this mnemonic is harmless.
pub fn is_optional(mnemonic: &str) -> bool {
    is_segment_override(mnemonic) || is_repeat_prefix(mnemonic) || mnemonic == NOP
}

/// The segment register selected by a segment override mnemonic.
pub fn override_segment(mnemonic: &str) -> Option<Register> {
    SEGMENT_OVERRIDES
        .iter()
        .position(|&m| m == mnemonic)
        .map(|i| Register::segment_from_encoding(i as u8))
}

/// Index of a handler in its `HandlerRegistry`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    canonical_name: String,
    mnemonic: String,
    suffix: Suffix,
    mandatory: bool,
}

impl Handler {
    fn new(mnemonic: &str, suffix: Suffix, qualified: bool) -> Self {
        let canonical_name = if qualified {
            format!("{}{}", mnemonic, suffix)
        } else {
            mnemonic.to_string()
        };

        Handler {
            canonical_name,
            mnemonic: mnemonic.to_string(),
            suffix,
            mandatory: !is_optional(mnemonic),
        }
    }

    /// The name the handler is known by, like `ADD_b`.
    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// The width suffix of the operands this handler was created for.
    ///
    /// This is set even when it is not part of the canonical name.
    pub fn suffix(&self) -> &Suffix {
        &self.suffix
    }

    /// Whether executing the handler without an implementation is an error.
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Name of the method implementing the handler in generated code.
    pub fn method_name(&self) -> String {
        let name = self.canonical_name.to_lowercase().replace(':', "_");
        if RUST_KEYWORDS.contains(&name.as_str()) {
            name + "_"
        } else {
            name
        }
    }
}

/// Insertion-ordered set of handlers, keyed by canonical name.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Handler>,
    by_name: HashMap<String, HandlerId>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handler with the same canonical name as `handler`, or
    /// registers `handler` if there is none.
    pub fn lookup_or_insert(&mut self, handler: Handler) -> HandlerId {
        if let Some(id) = self.by_name.get(&handler.canonical_name) {
            return *id;
        }

        let id = HandlerId(self.handlers.len());
        self.by_name.insert(handler.canonical_name.clone(), id);
        self.handlers.push(handler);
        id
    }

    pub fn get(&self, id: HandlerId) -> &Handler {
        &self.handlers[id.0]
    }

    pub fn find(&self, canonical_name: &str) -> Option<HandlerId> {
        self.by_name.get(canonical_name).cloned()
    }

    /// Iterates over all handlers in registration order.
    pub fn iter(&self) -> Iter {
        Iter {
            inner: self.handlers.iter().enumerate(),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Iterator over the handlers of a `HandlerRegistry`.
#[derive(Debug)]
pub struct Iter<'a> {
    inner: ::std::iter::Enumerate<slice::Iter<'a, Handler>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (HandlerId, &'a Handler);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(i, h)| (HandlerId(i), h))
    }
}

/// Decides the canonical handler name of every instruction occurrence.
#[derive(Debug)]
pub struct HandlerNamer {
    /// Distinct suffixes per mnemonic, in first-seen order.
    variants: HashMap<String, Vec<Suffix>>,
}

impl HandlerNamer {
    /// Collects the width variants of every mnemonic in `table`.
    pub fn new(table: &Table) -> Result<Self, CompileError> {
        let mut variants: HashMap<String, Vec<Suffix>> = HashMap::new();

        for occ in table.occurrences() {
            let suffix = resolve(occ.entry, occ.operands)?;
            let seen = variants.entry(occ.entry.mnemonic().to_string()).or_insert_with(Vec::new);
            if !seen.contains(&suffix) {
                seen.push(suffix);
            }
        }

        Ok(HandlerNamer { variants })
    }

    /// Whether `mnemonic` needs a width suffix to be unambiguous.
    pub fn is_qualified(&self, mnemonic: &str) -> bool {
        self.variants.get(mnemonic).map_or(false, |v| v.len() > 1)
    }

    /// Binds an instruction occurrence to its handler, registering it on
    /// first use.
    pub fn bind(
        &self,
        registry: &mut HandlerRegistry,
        entry: &OpcodeEntry,
        operands: &[OperandSpecifier],
    ) -> Result<HandlerId, CompileError> {
        let suffix = resolve(entry, operands)?;
        let handler = Handler::new(entry.mnemonic(), suffix, self.is_qualified(entry.mnemonic()));
        Ok(registry.lookup_or_insert(handler))
    }
}

fn resolve(entry: &OpcodeEntry, operands: &[OperandSpecifier]) -> Result<Suffix, CompileError> {
    width::resolve(operands).map_err(|error| CompileError::Width {
        mnemonic: entry.mnemonic().to_string(),
        line: entry.line(),
        error,
    })
}
