//! Dispatch tree synthesis.
//!
//! Turns a parsed `Table` into one `DispatchNode` per primary opcode. A node
//! lists the operand fetches to perform (in slot order, with the Mod-Reg-R/M
//! byte fetched once before the first operand that needs it) and what to do
//! afterwards: call a handler, dispatch on the `Reg` field into a group, or
//! record a prefix.

use compiler::handler::{self, HandlerId, HandlerNamer, HandlerRegistry};
use compiler::operand::{ByteRegister, OperandSpecifier, Register, Width};
use compiler::table::{self, GroupId, ParseError, Table};
use compiler::width::WidthError;

use std::{error, fmt};

/// An argument slot of the generated code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Arg1,
    Arg2,
}

const SLOTS: [Slot; table::MAX_OPERANDS] = [Slot::Arg1, Slot::Arg2];

impl Slot {
    /// The 1-based slot number.
    pub fn number(&self) -> usize {
        match self {
            Slot::Arg1 => 1,
            Slot::Arg2 => 2,
        }
    }
}

/// How a single operand is obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Fetch {
    /// A fixed 16-bit register.
    Register(Register),
    /// A fixed 8-bit register.
    ByteRegister(ByteRegister),
    /// Register or memory selected by Mod and R/M.
    RegMem(Width),
    /// General register selected by the `Reg` field.
    Reg(Width),
    /// Segment register selected by the `Reg` field.
    Segment,
    /// Immediate following the opcode. `Width::Far` reads a
    /// `segment:offset` pair.
    Immediate(Width),
    /// Signed displacement relative to the end of the instruction.
    Relative(Width),
    /// Memory at a 16-bit offset following the opcode.
    Offset(Width),
    /// Memory selected by Mod and R/M. Register forms are undefined.
    Memory(Width),
    /// A literal.
    Constant { value: u8, width: Width },
}

impl Fetch {
    /// Width of the fetched value.
    pub fn width(&self) -> Width {
        match *self {
            Fetch::Register(_) | Fetch::Segment => Width::Word,
            Fetch::ByteRegister(_) => Width::Byte,
            Fetch::RegMem(w)
            | Fetch::Reg(w)
            | Fetch::Immediate(w)
            | Fetch::Relative(w)
            | Fetch::Offset(w)
            | Fetch::Memory(w) => w,
            Fetch::Constant { width, .. } => width,
        }
    }

    pub fn needs_modrm(&self) -> bool {
        match self {
            Fetch::RegMem(_) | Fetch::Reg(_) | Fetch::Segment | Fetch::Memory(_) => true,
            _ => false,
        }
    }
}

/// A step of an opcode's operand fetch sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FetchStep {
    /// Read the Mod-Reg-R/M byte.
    ModRm,
    /// Fetch an operand into a slot.
    Bind { slot: Slot, fetch: Fetch },
}

/// Fetch steps followed by a handler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub steps: Vec<FetchStep>,
    pub handler: HandlerId,
}

/// Branch of a group node, taken when the `Reg` field equals `selector`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBranch {
    pub selector: u8,
    pub mnemonic: String,
    pub description: String,
    pub dispatch: Dispatch,
}

/// What happens after a node's own fetch steps have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Call a handler. The instruction is complete afterwards.
    Handler(HandlerId),
    /// Select a branch using the `Reg` field of the Mod-Reg-R/M byte.
    ///
    /// Branches are in member declaration order. A selector without a branch
    /// is an invalid opcode.
    Group { group: GroupId, branches: Vec<GroupBranch> },
    /// Override the segment of the following instruction's memory operand.
    SegmentOverride { segment: Register },
    /// Repeat the following string instruction.
    RepeatPrefix { opcode: u8 },
}

impl Outcome {
    /// Whether decoding stops after this outcome. Prefix outcomes continue
    /// with the next byte.
    pub fn completes_instruction(&self) -> bool {
        match self {
            Outcome::Handler(_) | Outcome::Group { .. } => true,
            Outcome::SegmentOverride { .. } | Outcome::RepeatPrefix { .. } => false,
        }
    }

    /// The handler called directly by this outcome.
    pub fn handler(&self) -> Option<HandlerId> {
        match self {
            Outcome::Handler(id) => Some(*id),
            _ => None,
        }
    }

    pub fn branch(&self, selector: u8) -> Option<&GroupBranch> {
        match self {
            Outcome::Group { branches, .. } => branches.iter().find(|b| b.selector == selector),
            _ => None,
        }
    }
}

/// Compiled action of a primary opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchNode {
    pub opcode: u8,
    pub mnemonic: String,
    /// Human-readable row description, like `ADD Eb, Gb`.
    pub description: String,
    pub steps: Vec<FetchStep>,
    pub outcome: Outcome,
}

/// One node per defined primary opcode, in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTree {
    nodes: Vec<DispatchNode>,
    index: Vec<Option<usize>>,
}

impl DispatchTree {
    fn new() -> Self {
        DispatchTree {
            nodes: Vec::new(),
            index: vec![None; 256],
        }
    }

    fn push(&mut self, node: DispatchNode) {
        self.index[node.opcode as usize] = Some(self.nodes.len());
        self.nodes.push(node);
    }

    /// Looks up the node of a primary opcode. `None` is an invalid opcode.
    pub fn node(&self, opcode: u8) -> Option<&DispatchNode> {
        self.index[opcode as usize].map(|i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[DispatchNode] {
        &self.nodes
    }
}

/// The products of compiling a table.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub tree: DispatchTree,
    pub handlers: HandlerRegistry,
}

/// Compiles opcode table source text.
pub fn compile_str(text: &str) -> Result<Compiled, CompileError> {
    let table = Table::parse(text)?;
    compile(&table)
}

/// Compiles a parsed table into a dispatch tree and its handler registry.
pub fn compile(table: &Table) -> Result<Compiled, CompileError> {
    let namer = HandlerNamer::new(table)?;
    let mut handlers = HandlerRegistry::new();
    let mut tree = DispatchTree::new();

    for entry in table.primary_entries() {
        let opcode = entry.opcode().expect("primary entry without opcode");
        let mnemonic = entry.mnemonic();

        let (steps, outcome) = if let Some(group) = entry.group() {
            let mut branches = Vec::new();
            for member in table.members(group) {
                let operands = member.effective_operands(entry.operands());
                let steps = synthesize(operands, true);
                let handler = namer.bind(&mut handlers, member, operands)?;
                branches.push(GroupBranch {
                    selector: member.sub_selector().expect("group member without selector"),
                    mnemonic: member.mnemonic().to_string(),
                    description: table::describe(member.mnemonic(), operands),
                    dispatch: Dispatch { steps, handler },
                });
            }

            (vec![FetchStep::ModRm], Outcome::Group { group, branches })
        } else if let Some(segment) = handler::override_segment(mnemonic) {
            // prefixes never call their handler, but still get a slot
            namer.bind(&mut handlers, entry, entry.operands())?;
            (Vec::new(), Outcome::SegmentOverride { segment })
        } else if handler::is_repeat_prefix(mnemonic) {
            namer.bind(&mut handlers, entry, entry.operands())?;
            (Vec::new(), Outcome::RepeatPrefix { opcode })
        } else {
            let steps = synthesize(entry.operands(), false);
            let handler = namer.bind(&mut handlers, entry, entry.operands())?;
            (steps, Outcome::Handler(handler))
        };

        let node = DispatchNode {
            opcode,
            mnemonic: mnemonic.to_string(),
            description: entry.description(),
            steps,
            outcome,
        };
        debug!("{:02X}: {} -> {:?}", opcode, node.description, node.outcome);
        tree.push(node);
    }

    info!(
        "compiled {} opcodes into {} handlers ({} groups)",
        tree.nodes.len(),
        handlers.len(),
        table.groups().len()
    );

    Ok(Compiled { tree, handlers })
}

/// Computes the fetch steps of an operand list.
///
/// `modrm_fetched` is set when the Mod-Reg-R/M byte was already read, as is
/// the case inside group branches.
fn synthesize(operands: &[OperandSpecifier], modrm_fetched: bool) -> Vec<FetchStep> {
    let mut steps = Vec::new();
    let mut modrm_fetched = modrm_fetched;
    let mut prev: Option<Width> = None;

    for (&slot, op) in SLOTS.iter().zip(operands) {
        let fetch = match *op {
            OperandSpecifier::Register(reg) => Fetch::Register(reg),
            OperandSpecifier::ByteRegister(reg) => Fetch::ByteRegister(reg),
            OperandSpecifier::RegMem(w) => Fetch::RegMem(w),
            OperandSpecifier::Reg(w) => Fetch::Reg(w),
            OperandSpecifier::Segment => Fetch::Segment,
            OperandSpecifier::Immediate(w) => Fetch::Immediate(w),
            OperandSpecifier::Relative(w) => Fetch::Relative(w),
            OperandSpecifier::Offset(w) => Fetch::Offset(w),
            OperandSpecifier::FarImmediate => Fetch::Immediate(Width::Far),
            OperandSpecifier::FarMemory => Fetch::Memory(Width::Far),
            OperandSpecifier::Memory => Fetch::Memory(Width::Word),
            OperandSpecifier::Constant(value) => {
                let width = match prev {
                    None | Some(Width::Byte) => Width::Byte,
                    Some(_) => Width::Word,
                };
                Fetch::Constant { value, width }
            }
        };

        if fetch.needs_modrm() && !modrm_fetched {
            steps.push(FetchStep::ModRm);
            modrm_fetched = true;
        }

        prev = Some(fetch.width());
        steps.push(FetchStep::Bind { slot, fetch });
    }

    steps
}

/// Errors that make a table uncompilable.
#[derive(Debug)]
pub enum CompileError {
    Parse(ParseError),
    /// An instruction's operands don't determine a width.
    Width {
        mnemonic: String,
        line: usize,
        error: WidthError,
    },
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompileError::Parse(e) => write!(f, "parse error at {}", e),
            CompileError::Width { mnemonic, line, error } => {
                write!(f, "line {}: {}: {}", line, mnemonic, error)
            }
        }
    }
}

impl error::Error for CompileError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            CompileError::Parse(e) => Some(e),
            CompileError::Width { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(text: &str) -> Compiled {
        compile_str(text).unwrap()
    }

    fn handler_name(compiled: &Compiled, id: HandlerId) -> &str {
        compiled.handlers.get(id).canonical_name()
    }

    #[test]
    fn add_rows() {
        let c = compile("00 ADD Eb Gb\n01 ADD Ev Gv\n");
        let node = c.tree.node(0x00).unwrap();
        assert_eq!(node.description, "ADD Eb, Gb");
        assert_eq!(
            node.steps,
            vec![
                FetchStep::ModRm,
                FetchStep::Bind { slot: Slot::Arg1, fetch: Fetch::RegMem(Width::Byte) },
                FetchStep::Bind { slot: Slot::Arg2, fetch: Fetch::Reg(Width::Byte) },
            ]
        );
        assert_eq!(handler_name(&c, node.outcome.handler().unwrap()), "ADD_b");

        let node = c.tree.node(0x01).unwrap();
        assert_eq!(handler_name(&c, node.outcome.handler().unwrap()), "ADD_w");
        assert_eq!(c.handlers.len(), 2);
        assert!(c.tree.node(0x02).is_none());
    }

    #[test]
    fn slot_order_follows_table() {
        let c = compile("03 ADD Gv Ev\n");
        assert_eq!(
            c.tree.node(0x03).unwrap().steps,
            vec![
                FetchStep::ModRm,
                FetchStep::Bind { slot: Slot::Arg1, fetch: Fetch::Reg(Width::Word) },
                FetchStep::Bind { slot: Slot::Arg2, fetch: Fetch::RegMem(Width::Word) },
            ]
        );
    }

    #[test]
    fn modrm_fetched_once() {
        let c = compile("8C MOV Ew Sw\nE4 IN AL Ib\n");
        let steps = &c.tree.node(0x8C).unwrap().steps;
        assert_eq!(steps.iter().filter(|s| **s == FetchStep::ModRm).count(), 1);
        assert_eq!(steps[0], FetchStep::ModRm);

        let steps = &c.tree.node(0xE4).unwrap().steps;
        assert!(!steps.contains(&FetchStep::ModRm));
        assert_eq!(
            steps[0],
            FetchStep::Bind { slot: Slot::Arg1, fetch: Fetch::ByteRegister(ByteRegister::Al) }
        );
    }

    #[test]
    fn constant_widths() {
        let c = compile("D0 SHL Eb 1\nD1 SHL Ev 1\nCC INT 3\n");
        let second = |op| c.tree.node(op).unwrap().steps.last().cloned().unwrap();
        assert_eq!(
            second(0xD0),
            FetchStep::Bind { slot: Slot::Arg2, fetch: Fetch::Constant { value: 1, width: Width::Byte } }
        );
        assert_eq!(
            second(0xD1),
            FetchStep::Bind { slot: Slot::Arg2, fetch: Fetch::Constant { value: 1, width: Width::Word } }
        );
        assert_eq!(
            second(0xCC),
            FetchStep::Bind { slot: Slot::Arg1, fetch: Fetch::Constant { value: 3, width: Width::Byte } }
        );
    }

    #[test]
    fn groups() {
        let c = compile("\
80 GRP1 Eb Ib
GRP1/0 ADD
GRP1/2 ADC
GRP1/5 SUB
");
        let node = c.tree.node(0x80).unwrap();
        assert_eq!(node.steps, vec![FetchStep::ModRm]);
        assert!(node.outcome.handler().is_none());

        let branches = match &node.outcome {
            Outcome::Group { branches, .. } => branches,
            other => panic!("not a group: {:?}", other),
        };
        let selectors = branches.iter().map(|b| b.selector).collect::<Vec<_>>();
        assert_eq!(selectors, vec![0, 2, 5]);
        assert!(node.outcome.branch(1).is_none());

        let sub = &branches[2];
        assert_eq!(sub.description, "SUB Eb, Ib");
        assert_eq!(handler_name(&c, sub.dispatch.handler), "SUB");
        // ModRM was fetched by the group node
        assert_eq!(
            sub.dispatch.steps,
            vec![
                FetchStep::Bind { slot: Slot::Arg1, fetch: Fetch::RegMem(Width::Byte) },
                FetchStep::Bind { slot: Slot::Arg2, fetch: Fetch::Immediate(Width::Byte) },
            ]
        );
    }

    #[test]
    fn prefixes() {
        let c = compile("26 ES:\n3E DS:\nF3 REPZ\n90 NOP\n");

        let es = c.tree.node(0x26).unwrap();
        assert_eq!(es.outcome, Outcome::SegmentOverride { segment: Register::Es });
        assert!(!es.outcome.completes_instruction());
        assert!(es.steps.is_empty());

        let rep = c.tree.node(0xF3).unwrap();
        assert_eq!(rep.outcome, Outcome::RepeatPrefix { opcode: 0xF3 });
        assert!(!rep.outcome.completes_instruction());

        // NOP is optional but still an instruction
        let nop = c.tree.node(0x90).unwrap();
        assert!(nop.outcome.completes_instruction());
        assert!(!c.handlers.get(nop.outcome.handler().unwrap()).is_mandatory());

        // prefix slots are registered in table order
        let names = c.handlers.iter().map(|(_, h)| h.canonical_name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["ES:", "DS:", "REPZ", "NOP"]);
    }

    #[test]
    fn errors() {
        match compile_str("00 ADD Eb Gb\n00 ADD Eb Gb\n").unwrap_err() {
            CompileError::Parse(e) => assert_eq!(e.line, 2),
            e => panic!("unexpected error: {}", e),
        }
        // prefixes can't be reached through a group branch
        match compile_str("80 GRP1 Eb Ib\nGRP1/0 ES:\nGRP1/1 REP\n").unwrap_err() {
            CompileError::Parse(e) => assert_eq!(e.line, 2),
            e => panic!("unexpected error: {}", e),
        }
        match compile_str("8D LEA M\n").unwrap_err() {
            CompileError::Width { line, .. } => assert_eq!(line, 1),
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn full_8086_table() {
        let c = compile(include_str!("../../tables/8086.txt"));
        for (_, handler) in c.handlers.iter() {
            if handler.suffix().is_empty() {
                continue;
            }
            // a suffixed name always carries the suffix it was created for
            if handler.canonical_name() != handler.mnemonic() {
                assert!(handler.canonical_name().ends_with(&handler.suffix().to_string()));
            }
        }

        assert_eq!(
            handler_name(&c, c.tree.node(0xD3).unwrap().outcome.branch(4).unwrap().dispatch.handler),
            "SHL_wb"
        );
        assert_eq!(handler_name(&c, c.tree.node(0xC4).unwrap().outcome.handler().unwrap()), "LES");
        assert!(c.tree.node(0x0F).is_none());
        assert!(c.tree.node(0xFF).unwrap().outcome.branch(7).is_none());
    }

    #[test]
    fn deterministic() {
        let text = include_str!("../../tables/8086.txt");
        assert_eq!(compile(text).tree, compile(text).tree);
    }
}
