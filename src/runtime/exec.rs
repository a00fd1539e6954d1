//! Runs decoded instructions by calling user-supplied handler
//! implementations.
//!
//! Handlers are bound by their canonical name. Executing an instruction whose
//! handler has no implementation falls back to the generated default: an
//! error for mandatory handlers, nothing for optional ones.

use compiler::compile::Compiled;
use compiler::handler::HandlerId;
use runtime::decode::{Decoder, DecoderError, Instr};

use std::collections::HashMap;
use std::{error, fmt};

type Implementation<'c, S> = Box<dyn FnMut(&mut S, &Instr) + 'c>;

/// Executes instructions against a user-defined state `S`.
#[allow(missing_debug_implementations)] // boxed closures
pub struct Executor<'c, S> {
    compiled: &'c Compiled,
    implementations: HashMap<HandlerId, Implementation<'c, S>>,
}

impl<'c, S> Executor<'c, S> {
    pub fn new(compiled: &'c Compiled) -> Self {
        Self {
            compiled,
            implementations: HashMap::new(),
        }
    }

    /// Binds an implementation to the handler with canonical name `name`.
    ///
    /// A previous implementation of the same handler is replaced.
    pub fn implement<F>(&mut self, name: &str, f: F) -> Result<&mut Self, ExecError>
    where
        F: FnMut(&mut S, &Instr) + 'c,
    {
        let id = self
            .compiled
            .handlers
            .find(name)
            .ok_or_else(|| ExecError::UnknownHandler(name.to_string()))?;
        self.implementations.insert(id, Box::new(f));
        Ok(self)
    }

    /// Canonical names of all mandatory handlers without an implementation,
    /// in registry order.
    pub fn unimplemented(&self) -> Vec<&'c str> {
        let compiled = self.compiled;
        compiled
            .handlers
            .iter()
            .filter(|(id, h)| h.is_mandatory() && !self.implementations.contains_key(id))
            .map(|(_, h)| h.canonical_name())
            .collect()
    }

    /// Executes a single decoded instruction.
    pub fn execute(&mut self, state: &mut S, instr: &Instr) -> Result<(), ExecError> {
        if let Some(imp) = self.implementations.get_mut(&instr.handler) {
            imp(state, instr);
            return Ok(());
        }

        let handler = self.compiled.handlers.get(instr.handler);
        if handler.is_mandatory() {
            Err(ExecError::NotImplemented {
                handler: handler.canonical_name().to_string(),
                address: instr.address,
            })
        } else {
            Ok(())
        }
    }

    /// Decodes and executes all instructions in `bytes`, located at `base`.
    ///
    /// Returns the number of executed instructions.
    pub fn run(&mut self, state: &mut S, bytes: &[u8], base: u32) -> Result<usize, ExecError> {
        let compiled = self.compiled;
        let mut decoder = Decoder::new(&compiled.tree, bytes, base);
        let mut count = 0;

        while !decoder.is_at_end() {
            let instr = decoder.decode_next()?;
            self.execute(state, &instr)?;
            count += 1;
        }

        debug!("executed {} instructions", count);
        Ok(count)
    }
}

/// Error returned when executing instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    Decoder(DecoderError),
    /// A mandatory handler was invoked without an implementation.
    NotImplemented { handler: String, address: u32 },
    /// `Executor::implement` was called with a name that is not registered.
    UnknownHandler(String),
}

impl From<DecoderError> for ExecError {
    #[cold]
    fn from(e: DecoderError) -> Self {
        ExecError::Decoder(e)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::Decoder(e) => fmt::Display::fmt(e, f),
            ExecError::NotImplemented { handler, address } => {
                write!(f, "{} not implemented (at {:#010X})", handler, address)
            }
            ExecError::UnknownHandler(name) => write!(f, "no handler named '{}'", name),
        }
    }
}

impl error::Error for ExecError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ExecError::Decoder(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::compile::compile_str;
    use runtime::decode::Arg;

    const TABLE: &str = "\
26 ES:
40 INC eAX
48 DEC eAX
90 NOP
B0 MOV AL Ib
B8 MOV eAX Iv
F4 HLT
FE GRP4 Eb
GRP4/0 INC
GRP4/1 DEC
";

    #[derive(Default)]
    struct Machine {
        ax: u16,
    }

    fn executor(compiled: &Compiled) -> Executor<Machine> {
        let mut exec = Executor::new(compiled);
        exec.implement("INC_w", |m: &mut Machine, _| m.ax = m.ax.wrapping_add(1))
            .unwrap()
            .implement("DEC_w", |m: &mut Machine, _| m.ax = m.ax.wrapping_sub(1))
            .unwrap()
            .implement("MOV_w", |m: &mut Machine, instr| {
                if let Arg::Imm16(imm) = instr.args[1] {
                    m.ax = imm;
                }
            })
            .unwrap();
        exec
    }

    #[test]
    fn runs_program() {
        let compiled = compile_str(TABLE).unwrap();
        let mut exec = executor(&compiled);
        let mut m = Machine::default();

        // mov ax,0x1234; inc ax; inc ax; nop; es: dec ax
        let n = exec.run(&mut m, &[0xB8, 0x34, 0x12, 0x40, 0x40, 0x90, 0x26, 0x48], 0).unwrap();
        assert_eq!(n, 5);
        assert_eq!(m.ax, 0x1235);
    }

    #[test]
    fn not_implemented_vs_invalid() {
        let compiled = compile_str(TABLE).unwrap();
        let mut exec = executor(&compiled);
        let mut m = Machine::default();

        assert_eq!(
            exec.run(&mut m, &[0x40, 0xF4], 0x10).unwrap_err(),
            ExecError::NotImplemented { handler: "HLT".to_string(), address: 0x11 }
        );
        assert_eq!(
            exec.run(&mut m, &[0x0F], 0).unwrap_err(),
            ExecError::Decoder(DecoderError::InvalidOpcode { opcode: 0x0F, address: 0 })
        );
        // FE /2 is not part of GRP4
        assert_eq!(
            exec.run(&mut m, &[0xFE, 0xD0], 0).unwrap_err(),
            ExecError::Decoder(DecoderError::InvalidGroupSelector {
                opcode: 0xFE,
                selector: 2,
                address: 0,
            })
        );
    }

    #[test]
    fn unimplemented() {
        let compiled = compile_str(TABLE).unwrap();
        let mut exec = executor(&compiled);
        assert_eq!(exec.unimplemented(), vec!["MOV_b", "HLT", "INC_b", "DEC_b"]);

        exec.implement("HLT", |_, _| {}).unwrap();
        assert_eq!(exec.unimplemented(), vec!["MOV_b", "INC_b", "DEC_b"]);

        match exec.implement("JMP", |_, _| {}) {
            Err(ExecError::UnknownHandler(name)) => assert_eq!(name, "JMP"),
            _ => panic!("JMP should not be registered"),
        }
    }
}
