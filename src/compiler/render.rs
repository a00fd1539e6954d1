//! Renders compiled tables as Rust source text.
//!
//! The dispatch text is a `match` over `self.opcode`, meant to be spliced
//! into a method of the decoder. The handler text declares one default trait
//! method per handler. Both are deterministic: the same table always renders
//! to the same text.

use compiler::compile::{Compiled, Dispatch, DispatchNode, Fetch, FetchStep, Outcome};
use compiler::handler::{Handler, HandlerRegistry};
use compiler::operand::Width;

/// Line-based source writer with 4-space indentation.
struct CodeWriter {
    lines: Vec<String>,
    indent: usize,
}

impl CodeWriter {
    fn new() -> Self {
        CodeWriter {
            lines: Vec::new(),
            indent: 0,
        }
    }

    fn line<S: AsRef<str>>(&mut self, s: S) {
        let mut line = "    ".repeat(self.indent);
        line.push_str(s.as_ref());
        self.lines.push(line);
    }

    /// Writes `head`, then everything `f` writes one level deeper, then
    /// `tail`.
    fn block<S, F>(&mut self, head: S, tail: &str, f: F)
    where
        S: AsRef<str>,
        F: FnOnce(&mut Self),
    {
        self.line(head);
        self.indent += 1;
        f(self);
        self.indent -= 1;
        self.line(tail);
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}

/// Renders the dispatch `match` of a compiled table.
///
/// The result has no trailing newline.
pub fn render_dispatch(compiled: &Compiled) -> String {
    let mut w = CodeWriter::new();

    w.block("match self.opcode {", "}", |w| {
        for node in compiled.tree.nodes() {
            w.block(arm_head(&format!("0x{:02X}", node.opcode), &node.description), "}", |w| {
                node_body(w, compiled, node);
            });
        }
        w.line("_ => self.invalid_opcode(),");
    });

    w.finish()
}

fn arm_head(pattern: &str, description: &str) -> String {
    format!("{} => {{  // {}", pattern, description)
}

fn node_body(w: &mut CodeWriter, compiled: &Compiled, node: &DispatchNode) {
    w.line(format!("self.opcode_desc = {:?};", node.mnemonic));
    steps(w, &node.steps);

    match &node.outcome {
        Outcome::Handler(id) => call(w, compiled.handlers.get(*id)),
        Outcome::Group { branches, .. } => {
            w.block("match self.modrm_reg() {", "}", |w| {
                for branch in branches {
                    w.block(arm_head(&branch.selector.to_string(), &branch.description), "}", |w| {
                        w.line(format!("self.opcode_desc = {:?};", branch.mnemonic));
                        dispatch(w, &compiled.handlers, &branch.dispatch);
                    });
                }
                w.line("_ => self.invalid_opcode(),");
            });
        }
        Outcome::SegmentOverride { segment } => {
            w.line("self.is_prefix = true;");
            w.line(format!("self.segment = self.reg16(Register::{});", segment.variant()));
            w.line(format!("self.segment_desc = {:?};", node.mnemonic));
        }
        Outcome::RepeatPrefix { opcode } => {
            w.line("self.is_prefix = true;");
            w.line(format!("self.rep_opcode = 0x{:02X};", opcode));
            w.line(format!("self.rep_desc = {:?};", node.mnemonic));
        }
    }
}

fn dispatch(w: &mut CodeWriter, handlers: &HandlerRegistry, dispatch: &Dispatch) {
    steps(w, &dispatch.steps);
    call(w, handlers.get(dispatch.handler));
}

fn call(w: &mut CodeWriter, handler: &Handler) {
    w.line(format!("self.{}();", handler.method_name()));
}

fn steps(w: &mut CodeWriter, steps: &[FetchStep]) {
    for step in steps {
        match step {
            FetchStep::ModRm => w.line("self.fetch_modrm();"),
            FetchStep::Bind { slot, fetch } => {
                w.line(format!("self.arg{} = {};", slot.number(), fetch_expr(fetch)));
                if let Some(desc) = const_desc(fetch) {
                    w.line(format!("self.add_const_arg_desc({:?});", desc));
                }
            }
        }
    }
}

fn fetch_expr(fetch: &Fetch) -> String {
    match *fetch {
        Fetch::Register(reg) => format!("self.reg16(Register::{})", reg.variant()),
        Fetch::ByteRegister(reg) => format!("self.reg8(ByteRegister::{})", reg.variant()),
        Fetch::RegMem(w) => format!("self.decode_rm_{}()", w.tag()),
        Fetch::Reg(w) => format!("self.decode_reg_{}()", w.tag()),
        Fetch::Segment => "self.decode_segment()".to_string(),
        Fetch::Immediate(Width::Far) => "self.fetch_far_ptr()".to_string(),
        Fetch::Immediate(w) => format!("self.fetch_imm_{}()", w.tag()),
        Fetch::Relative(w) => format!("self.fetch_rel_{}()", w.tag()),
        Fetch::Offset(w) => format!("self.fetch_offset_{}()", w.tag()),
        Fetch::Memory(w) => format!("self.decode_mem_{}()", w.tag()),
        Fetch::Constant { value, width } => format!("self.constant_{}({})", width.tag(), value),
    }
}

/// Operands that are fully known at compile time get a fixed description.
fn const_desc(fetch: &Fetch) -> Option<String> {
    match *fetch {
        Fetch::Register(reg) => Some(reg.name().to_string()),
        Fetch::ByteRegister(reg) => Some(reg.name().to_string()),
        Fetch::Constant { value, .. } => Some(value.to_string()),
        _ => None,
    }
}

/// Renders one default method per handler, in registry order.
///
/// Mandatory handlers report themselves as not implemented, optional ones do
/// nothing. The result has no trailing newline.
pub fn render_handlers(handlers: &HandlerRegistry) -> String {
    let mut w = CodeWriter::new();

    for (_, handler) in handlers.iter() {
        if handler.is_mandatory() {
            w.line(format!(
                "fn {}(&mut self) {{ self.not_implemented({:?}); }}",
                handler.method_name(),
                handler.canonical_name()
            ));
        } else {
            w.line(format!("fn {}(&mut self) {{}}", handler.method_name()));
        }
    }

    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::compile::compile_str;

    fn dispatch(table: &str) -> String {
        render_dispatch(&compile_str(table).unwrap())
    }

    fn handlers(table: &str) -> String {
        render_handlers(&compile_str(table).unwrap().handlers)
    }

    #[test]
    fn add() {
        assert_eq!(dispatch("00 ADD Eb Gb\n05 ADD eAX Iv\n"), "\
match self.opcode {
    0x00 => {  // ADD Eb, Gb
        self.opcode_desc = \"ADD\";
        self.fetch_modrm();
        self.arg1 = self.decode_rm_b();
        self.arg2 = self.decode_reg_b();
        self.add_b();
    }
    0x05 => {  // ADD AX, Iv
        self.opcode_desc = \"ADD\";
        self.arg1 = self.reg16(Register::Ax);
        self.add_const_arg_desc(\"AX\");
        self.arg2 = self.fetch_imm_w();
        self.add_w();
    }
    _ => self.invalid_opcode(),
}");
    }

    #[test]
    fn group() {
        assert_eq!(dispatch("D1 GRP2 Ev 1\nGRP2/4 SHL\nGRP2/7 SAR\n"), "\
match self.opcode {
    0xD1 => {  // GRP2 Ev, 1
        self.opcode_desc = \"GRP2\";
        self.fetch_modrm();
        match self.modrm_reg() {
            4 => {  // SHL Ev, 1
                self.opcode_desc = \"SHL\";
                self.arg1 = self.decode_rm_w();
                self.arg2 = self.constant_w(1);
                self.add_const_arg_desc(\"1\");
                self.shl();
            }
            7 => {  // SAR Ev, 1
                self.opcode_desc = \"SAR\";
                self.arg1 = self.decode_rm_w();
                self.arg2 = self.constant_w(1);
                self.add_const_arg_desc(\"1\");
                self.sar();
            }
            _ => self.invalid_opcode(),
        }
    }
    _ => self.invalid_opcode(),
}");
    }

    #[test]
    fn prefixes() {
        assert_eq!(dispatch("2E CS:\nF2 REPNZ\n"), "\
match self.opcode {
    0x2E => {  // CS:
        self.opcode_desc = \"CS:\";
        self.is_prefix = true;
        self.segment = self.reg16(Register::Cs);
        self.segment_desc = \"CS:\";
    }
    0xF2 => {  // REPNZ
        self.opcode_desc = \"REPNZ\";
        self.is_prefix = true;
        self.rep_opcode = 0xF2;
        self.rep_desc = \"REPNZ\";
    }
    _ => self.invalid_opcode(),
}");
    }

    #[test]
    fn empty_table() {
        assert_eq!(dispatch(""), "\
match self.opcode {
    _ => self.invalid_opcode(),
}");
        assert_eq!(handlers(""), "");
    }

    #[test]
    fn handler_list() {
        assert_eq!(
            handlers("00 ADD Eb Gb\n26 ES:\n01 ADD Ev Gv\n90 NOP\nC4 LES Gv Mp\n"),
            "\
fn add_b(&mut self) { self.not_implemented(\"ADD_b\"); }
fn es_(&mut self) {}
fn add_w(&mut self) { self.not_implemented(\"ADD_w\"); }
fn nop(&mut self) {}
fn les(&mut self) { self.not_implemented(\"LES\"); }"
        );
    }

    #[test]
    fn far_operands() {
        let text = dispatch("9A CALL Ap\nE8 CALL Jv\nFF GRP5 Ev\nGRP5/3 CALL Mp\n");
        assert!(text.contains("self.arg1 = self.fetch_far_ptr();\n        self.call_p();"));
        assert!(text.contains("self.arg1 = self.decode_mem_p();\n                self.call_p();"));
    }

    #[test]
    fn keyword_mnemonics() {
        let table = include_str!("../../tables/8086.txt");
        assert!(handlers(table).contains("\nfn loop_(&mut self) { self.not_implemented(\"LOOP\"); }\n"));
        assert!(!handlers(table).contains("fn loop("));

        let text = dispatch(table);
        assert!(text.contains("        self.loop_();\n"));
        assert!(!text.contains("self.loop();"));
    }

    #[test]
    fn deterministic() {
        let table = include_str!("../../tables/8086.txt");
        assert_eq!(dispatch(table), dispatch(table));
        assert_eq!(handlers(table), handlers(table));
    }
}
