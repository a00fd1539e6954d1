//! Opcode table parser.
//!
//! A table is a line-based text format. Every row starts with a selector,
//! followed by a mnemonic and up to 2 operand specifiers:
//!
//! ```text
//! 00 ADD Eb Gb
//! 26 ES:
//! 80 GRP1 Eb Ib
//! GRP1/0 ADD
//! GRP1/7 CMP
//! ```
//!
//! A selector is either a 2-digit hex opcode or `GRPn/d`, which defines the
//! member of group `GRPn` selected by a `Reg` field value of `d`. Group
//! members may omit their operands, in which case the operands of the row
//! referencing the group are used.
//!
//! Lines starting with `#` are comments. Rows with fewer than 2 tokens and
//! rows whose mnemonic is `--` are ignored. The first empty line ends the
//! table.

use compiler::handler;
use compiler::operand::OperandSpecifier;

use std::collections::HashMap;
use std::{error, fmt};

/// Prefix of every group name.
pub const GROUP_MARKER: &str = "GRP";

/// Mnemonic marking an unassigned opcode or group member.
pub const UNASSIGNED: &str = "--";

/// Maximum number of operands a row can have.
pub const MAX_OPERANDS: usize = 2;

/// Identifies a group inside its `Table`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

/// The left-most token of a table row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// A primary opcode byte.
    Primary(u8),
    /// A group member, selected by the `Reg` field of the Mod-Reg-R/M byte.
    Member { group: GroupId, sub: u8 },
}

/// A single row of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeEntry {
    selector: Selector,
    mnemonic: String,
    operands: Vec<OperandSpecifier>,
    /// Set when a primary row's mnemonic names a group.
    group: Option<GroupId>,
    /// 1-based line number in the source text.
    line: usize,
}

impl OpcodeEntry {
    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// The primary opcode of this row, or `None` for group members.
    pub fn opcode(&self) -> Option<u8> {
        match self.selector {
            Selector::Primary(op) => Some(op),
            Selector::Member { .. } => None,
        }
    }

    /// The `Reg` field value selecting this group member.
    pub fn sub_selector(&self) -> Option<u8> {
        match self.selector {
            Selector::Primary(_) => None,
            Selector::Member { sub, .. } => Some(sub),
        }
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn operands(&self) -> &[OperandSpecifier] {
        &self.operands
    }

    /// The group this row dispatches to, if it is a group reference.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// The operands to use when this row is a group member referenced by a
    /// row with operands `shared`.
    pub fn effective_operands<'a>(&'a self, shared: &'a [OperandSpecifier]) -> &'a [OperandSpecifier] {
        if self.operands.is_empty() {
            shared
        } else {
            &self.operands
        }
    }

    /// Human-readable description, like `ADD Eb, Gb`.
    pub fn description(&self) -> String {
        describe(&self.mnemonic, &self.operands)
    }
}

/// Formats a mnemonic followed by its comma-separated operands.
pub fn describe(mnemonic: &str, operands: &[OperandSpecifier]) -> String {
    let mut s = mnemonic.to_string();
    for (i, op) in operands.iter().enumerate() {
        s.push_str(if i == 0 { " " } else { ", " });
        s.push_str(&op.to_string());
    }
    s
}

/// A named group of instructions sharing a primary opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    name: String,
    /// Indices into `Table::entries`, in declaration order.
    members: Vec<usize>,
}

impl Group {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A parsed opcode table.
#[derive(Debug, Clone)]
pub struct Table {
    entries: Vec<OpcodeEntry>,
    groups: Vec<Group>,
    group_index: HashMap<String, GroupId>,
}

impl Table {
    /// Parses the textual table format.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut table = Table {
            entries: Vec::new(),
            groups: Vec::new(),
            group_index: HashMap::new(),
        };
        let mut primary_seen = [false; 256];

        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if line.starts_with('#') {
                continue;
            }

            let tokens = line.split_whitespace().collect::<Vec<_>>();
            if tokens.len() < 2 || tokens[1] == UNASSIGNED {
                continue;
            }

            let err = |kind| ParseError { line: line_no, kind };

            let operands = tokens[2..]
                .iter()
                .map(|tok| {
                    OperandSpecifier::parse(tok)
                        .ok_or_else(|| err(ParseErrorKind::UnknownOperand(tok.to_string())))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if operands.len() > MAX_OPERANDS {
                return Err(err(ParseErrorKind::TooManyOperands(operands.len())));
            }

            let mnemonic = tokens[1].to_uppercase();
            let selector = table.parse_selector(tokens[0]).map_err(&err)?;

            let index = table.entries.len();
            match selector {
                Selector::Primary(op) => {
                    if primary_seen[op as usize] {
                        return Err(err(ParseErrorKind::DuplicateOpcode(op)));
                    }
                    primary_seen[op as usize] = true;
                }
                Selector::Member { group, sub } => {
                    let duplicate = table.groups[group.0]
                        .members
                        .iter()
                        .any(|&m| table.entries[m].sub_selector() == Some(sub));
                    if duplicate {
                        let name = table.groups[group.0].name.clone();
                        return Err(err(ParseErrorKind::DuplicateGroupMember { group: name, sub }));
                    }
                    if handler::is_segment_override(&mnemonic) || handler::is_repeat_prefix(&mnemonic) {
                        let name = table.groups[group.0].name.clone();
                        return Err(err(ParseErrorKind::PrefixInGroup { group: name, mnemonic }));
                    }
                    table.groups[group.0].members.push(index);
                }
            }

            table.entries.push(OpcodeEntry {
                selector,
                mnemonic,
                operands,
                group: None,
                line: line_no,
            });
        }

        table.link_groups()?;

        Ok(table)
    }

    fn parse_selector(&mut self, token: &str) -> Result<Selector, ParseErrorKind> {
        let malformed = || ParseErrorKind::MalformedSelector(token.to_string());

        if token.to_uppercase().starts_with(GROUP_MARKER) {
            let slash = token.find('/').ok_or_else(malformed)?;
            let name = token[..slash].to_uppercase();
            let digit = &token[slash + 1..];
            if name.len() == GROUP_MARKER.len() || digit.len() != 1 {
                return Err(malformed());
            }
            let sub = digit.parse::<u8>().map_err(|_| malformed())?;
            if sub > 7 {
                return Err(ParseErrorKind::GroupSelectorOutOfRange(sub));
            }

            let group = self.group_id(&name);
            Ok(Selector::Member { group, sub })
        } else {
            if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed());
            }
            u8::from_str_radix(token, 16)
                .map(Selector::Primary)
                .map_err(|_| malformed())
        }
    }

    fn group_id(&mut self, name: &str) -> GroupId {
        if let Some(id) = self.group_index.get(name) {
            return *id;
        }

        let id = GroupId(self.groups.len());
        self.groups.push(Group {
            name: name.to_string(),
            members: Vec::new(),
        });
        self.group_index.insert(name.to_string(), id);
        id
    }

    /// Resolves the group references of primary rows.
    fn link_groups(&mut self) -> Result<(), ParseError> {
        let mut referenced = vec![false; self.groups.len()];

        for i in 0..self.entries.len() {
            if self.entries[i].opcode().is_none()
                || !self.entries[i].mnemonic.starts_with(GROUP_MARKER)
            {
                continue;
            }

            let name = self.entries[i].mnemonic.clone();
            let id = match self.group_index.get(&name) {
                Some(&id) if !self.groups[id.0].members.is_empty() => id,
                _ => {
                    return Err(ParseError {
                        line: self.entries[i].line,
                        kind: ParseErrorKind::EmptyGroup(name),
                    })
                }
            };

            referenced[id.0] = true;
            self.entries[i].group = Some(id);
        }

        for (group, referenced) in self.groups.iter().zip(referenced) {
            if !referenced {
                warn!("group {} is defined but never referenced", group.name);
            }
        }

        Ok(())
    }

    /// All rows, in source order.
    pub fn entries(&self) -> &[OpcodeEntry] {
        &self.entries
    }

    /// Rows with a primary opcode selector, in source order.
    pub fn primary_entries<'a>(&'a self) -> impl Iterator<Item = &'a OpcodeEntry> + 'a {
        self.entries.iter().filter(|e| e.opcode().is_some())
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.group_index.get(&name.to_uppercase()).cloned()
    }

    /// Members of a group, in declaration order.
    pub fn members<'a>(&'a self, id: GroupId) -> impl Iterator<Item = &'a OpcodeEntry> + 'a {
        self.groups[id.0].members.iter().map(move |&i| &self.entries[i])
    }

    /// Every place an instruction can be reached from a primary opcode,
    /// together with the operands it is decoded with.
    ///
    /// A group member referenced from several opcodes yields one occurrence
    /// per referencing row.
    pub fn occurrences(&self) -> Vec<Occurrence> {
        let mut out = Vec::new();
        for entry in self.primary_entries() {
            match entry.group {
                None => out.push(Occurrence {
                    entry,
                    operands: &entry.operands,
                }),
                Some(group) => {
                    for member in self.members(group) {
                        out.push(Occurrence {
                            entry: member,
                            operands: member.effective_operands(&entry.operands),
                        });
                    }
                }
            }
        }
        out
    }
}

/// An instruction row together with the operands it is decoded with.
#[derive(Debug, Copy, Clone)]
pub struct Occurrence<'a> {
    pub entry: &'a OpcodeEntry,
    pub operands: &'a [OperandSpecifier],
}

/// A structural error in the opcode table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number the error was found on.
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    MalformedSelector(String),
    GroupSelectorOutOfRange(u8),
    TooManyOperands(usize),
    UnknownOperand(String),
    DuplicateOpcode(u8),
    DuplicateGroupMember { group: String, sub: u8 },
    /// A row references a group that has no members.
    EmptyGroup(String),
    /// Prefixes only exist as primary opcodes.
    PrefixInGroup { group: String, mnemonic: String },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::ParseErrorKind::*;

        match self {
            MalformedSelector(s) => write!(f, "malformed selector '{}'", s),
            GroupSelectorOutOfRange(sub) => write!(f, "group selector {} out of range 0-7", sub),
            TooManyOperands(n) => write!(f, "{} operands given, at most {} allowed", n, MAX_OPERANDS),
            UnknownOperand(s) => write!(f, "unknown operand specifier '{}'", s),
            DuplicateOpcode(op) => write!(f, "opcode {:02X} defined twice", op),
            DuplicateGroupMember { group, sub } => write!(f, "{}/{} defined twice", group, sub),
            EmptyGroup(name) => write!(f, "group {} has no members", name),
            PrefixInGroup { group, mnemonic } => {
                write!(f, "prefix {} cannot be a member of group {}", mnemonic, group)
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl error::Error for ParseError {}
