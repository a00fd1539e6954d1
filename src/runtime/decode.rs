//! Table-driven 8086 instruction decoder.
//!
//! Walks a compiled `DispatchTree` over a byte slice the same way the
//! generated dispatch code does: prefixes are accumulated until an opcode
//! completing an instruction is found, then the node's fetch steps run and
//! the instruction is returned with its operands fully decoded.

use compiler::compile::{DispatchTree, Fetch, FetchStep, Outcome};
use compiler::handler::HandlerId;
use compiler::operand::{ByteRegister, Register, Width};
use runtime::prefix::Prefixes;

use std::fmt;

/// Decodes instructions from a byte slice.
#[derive(Debug)]
pub struct Decoder<'a, 't> {
    tree: &'t DispatchTree,
    bytes: &'a [u8],
    /// Address of `bytes[0]`.
    base: u32,
    /// Offset of the next byte to read.
    pos: usize,
    /// Offset of the first byte of the current instruction.
    start: usize,
    prefixes: Prefixes,
    /// Mnemonic of the repeat prefix of the current instruction.
    repeat: Option<String>,
    modrm: Option<ModRegRm>,
}

impl<'a, 't> Decoder<'a, 't> {
    /// Creates a decoder for `bytes`, which are located at address `base`.
    pub fn new(tree: &'t DispatchTree, bytes: &'a [u8], base: u32) -> Self {
        Self {
            tree,
            bytes,
            base,
            pos: 0,
            start: 0,
            prefixes: Prefixes::empty(),
            repeat: None,
            modrm: None,
        }
    }

    /// Returns the address of the next instruction to be decoded.
    pub fn current_address(&self) -> u32 {
        self.address_of(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn address_of(&self, offset: usize) -> u32 {
        self.base.wrapping_add(offset as u32)
    }

    /// Decodes the next instruction, including its prefixes.
    ///
    /// After an error, the decoder position is somewhere inside the failed
    /// instruction.
    pub fn decode_next(&mut self) -> Result<Instr, DecoderError> {
        let tree = self.tree;

        self.start = self.pos;
        self.prefixes = Prefixes::empty();
        self.repeat = None;
        self.modrm = None;

        loop {
            let opcode = self.read()?;
            let node = match tree.node(opcode) {
                Some(node) => node,
                None => {
                    return Err(DecoderError::InvalidOpcode {
                        opcode,
                        address: self.address_of(self.start),
                    })
                }
            };

            match &node.outcome {
                Outcome::SegmentOverride { segment } => {
                    self.prefixes.set_segment(*segment)?;
                    continue;
                }
                Outcome::RepeatPrefix { opcode } => {
                    self.prefixes.set_repeat(*opcode);
                    self.repeat = Some(node.mnemonic.clone());
                    continue;
                }
                Outcome::Handler(_) | Outcome::Group { .. } => {}
            }

            let mut args = Vec::new();
            self.run_steps(&node.steps, &mut args)?;

            let (mnemonic, handler, selector) = match &node.outcome {
                Outcome::Group { .. } => {
                    let selector = self.modrm()?.reg_raw();
                    let branch = match node.outcome.branch(selector) {
                        Some(branch) => branch,
                        None => {
                            return Err(DecoderError::InvalidGroupSelector {
                                opcode,
                                selector,
                                address: self.address_of(self.start),
                            })
                        }
                    };
                    self.run_steps(&branch.dispatch.steps, &mut args)?;
                    (&branch.mnemonic, branch.dispatch.handler, Some(selector))
                }
                Outcome::Handler(id) => (&node.mnemonic, *id, None),
                Outcome::SegmentOverride { .. } | Outcome::RepeatPrefix { .. } => unreachable!(),
            };

            let instr = Instr {
                address: self.address_of(self.start),
                len: (self.pos - self.start) as u32,
                opcode,
                selector,
                mnemonic: mnemonic.clone(),
                handler,
                args,
                prefixes: self.prefixes,
                repeat: self.repeat.take(),
            };
            trace!("{:08X}: {}", instr.address, instr);
            return Ok(instr);
        }
    }

    fn run_steps(&mut self, steps: &[FetchStep], args: &mut Vec<Arg>) -> Result<(), DecoderError> {
        for step in steps {
            match step {
                FetchStep::ModRm => self.modrm = Some(ModRegRm(self.read()?)),
                FetchStep::Bind { fetch, .. } => {
                    let arg = self.fetch(fetch)?;
                    args.push(arg);
                }
            }
        }
        Ok(())
    }

    fn fetch(&mut self, fetch: &Fetch) -> Result<Arg, DecoderError> {
        Ok(match *fetch {
            Fetch::Register(reg) => Arg::Reg(reg),
            Fetch::ByteRegister(reg) => Arg::Reg8(reg),
            Fetch::RegMem(width) => {
                let modrm = self.modrm()?;
                if modrm.addressing_mode() == AddressingMode::Register {
                    modrm.rm_as_reg(width)
                } else {
                    Arg::Mem(self.read_addressing(modrm, width)?)
                }
            }
            Fetch::Reg(width) => {
                let modrm = self.modrm()?;
                reg_arg(modrm.reg_raw(), width)
            }
            Fetch::Segment => Arg::Reg(Register::segment_from_encoding(self.modrm()?.reg_raw())),
            Fetch::Immediate(Width::Byte) => Arg::Imm8(self.read()?),
            Fetch::Immediate(Width::Word) => Arg::Imm16(self.read_u16()?),
            Fetch::Immediate(Width::Far) => {
                let offset = self.read_u16()?;
                let segment = self.read_u16()?;
                Arg::Far { segment, offset }
            }
            Fetch::Relative(Width::Byte) => Arg::Rel8(self.read()? as i8),
            Fetch::Relative(_) => Arg::Rel16(self.read_u16()? as i16),
            Fetch::Offset(width) => Arg::Mem(MemoryLocation {
                width,
                segment: self.prefixes.segment(Register::Ds),
                base: None,
                index: None,
                disp: self.read_u16()?,
            }),
            Fetch::Memory(width) => {
                let modrm = self.modrm()?;
                if modrm.addressing_mode() == AddressingMode::Register {
                    return Err(DecoderError::ud(format!(
                        "register operand {:#04X} where memory is required",
                        modrm.0
                    )));
                }
                Arg::Mem(self.read_addressing(modrm, width)?)
            }
            Fetch::Constant { value, width: Width::Byte } => Arg::Imm8(value),
            Fetch::Constant { value, .. } => Arg::Imm16(u16::from(value)),
        })
    }

    fn read(&mut self) -> Result<u8, DecoderError> {
        match self.bytes.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                Ok(b)
            }
            None => Err(DecoderError::Truncated {
                address: self.address_of(self.start),
            }),
        }
    }

    fn read_u16(&mut self) -> Result<u16, DecoderError> {
        let lo = self.read()?;
        let hi = self.read()?;
        Ok(u16::from(lo) | u16::from(hi) << 8)
    }

    fn modrm(&self) -> Result<ModRegRm, DecoderError> {
        self.modrm
            .ok_or_else(|| DecoderError::ud("operand needs a Mod-Reg-R/M byte, but none was read"))
    }

    /// Reads the displacement specified by a Mod-Reg-R/M byte and computes
    /// the memory operand.
    fn read_addressing(&mut self, modrm: ModRegRm, width: Width) -> Result<MemoryLocation, DecoderError> {
        let mode = modrm.addressing_mode();
        let (base, index) = match modrm.rm_raw() {
            0b000 => (Some(Register::Bx), Some(Register::Si)),
            0b001 => (Some(Register::Bx), Some(Register::Di)),
            0b010 => (Some(Register::Bp), Some(Register::Si)),
            0b011 => (Some(Register::Bp), Some(Register::Di)),
            0b100 => (Some(Register::Si), None),
            0b101 => (Some(Register::Di), None),
            // mod=00 with BP encodes a direct 16-bit address instead
            0b110 if mode == AddressingMode::RegIndirect => (None, None),
            0b110 => (Some(Register::Bp), None),
            0b111 => (Some(Register::Bx), None),
            _ => unreachable!(),
        };

        let disp = match mode {
            AddressingMode::RegIndirect if base.is_none() => self.read_u16()?,
            AddressingMode::RegIndirect => 0,
            AddressingMode::Disp8 => self.read()? as i8 as u16,
            AddressingMode::Disp16 => self.read_u16()?,
            AddressingMode::Register => unreachable!(),
        };

        let default_segment = if base == Some(Register::Bp) {
            Register::Ss
        } else {
            Register::Ds
        };

        Ok(MemoryLocation {
            width,
            segment: self.prefixes.segment(default_segment),
            base,
            index,
            disp,
        })
    }
}

fn reg_arg(bits: u8, width: Width) -> Arg {
    match width {
        Width::Byte => Arg::Reg8(ByteRegister::from_encoding(bits)),
        Width::Word | Width::Far => Arg::Reg(Register::from_encoding(bits)),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AddressingMode {
    /// `[reg]`, or a direct address when R/M is `0b110`.
    RegIndirect,
    /// `[reg + disp8]`
    Disp8,
    /// `[reg + disp16]`
    Disp16,
    /// `reg`
    Register,
}

/// A Mod-Reg-R/M byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct ModRegRm(u8);

impl ModRegRm {
    fn addressing_mode(&self) -> AddressingMode {
        match self.0 {
            b if bitpat!(0 0 _ _ _ _ _ _)(b) => AddressingMode::RegIndirect,
            b if bitpat!(0 1 _ _ _ _ _ _)(b) => AddressingMode::Disp8,
            b if bitpat!(1 0 _ _ _ _ _ _)(b) => AddressingMode::Disp16,
            _ => AddressingMode::Register,
        }
    }

    /// Gets the raw value of the `Reg` field, which doubles as the group
    /// selector.
    fn reg_raw(&self) -> u8 {
        (self.0 & 0b00111000) >> 3
    }

    fn rm_raw(&self) -> u8 {
        self.0 & 0b111
    }

    /// Interprets the R/M field as a register, for the register addressing
    /// mode.
    fn rm_as_reg(&self, width: Width) -> Arg {
        reg_arg(self.rm_raw(), width)
    }
}

/// A memory operand.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryLocation {
    /// Width of the accessed value.
    pub width: Width,
    /// Segment the address is relative to, after applying overrides.
    pub segment: Register,
    pub base: Option<Register>,
    pub index: Option<Register>,
    /// Displacement, or the full address if there is no base register.
    pub disp: u16,
}

impl MemoryLocation {
    /// Computes the effective (offset) address, given a way to read
    /// registers.
    pub fn effective_address<F>(&self, mut reg: F) -> u16
    where
        F: FnMut(Register) -> u16,
    {
        let base = self.base.map_or(0, &mut reg);
        let index = self.index.map_or(0, &mut reg);
        base.wrapping_add(index).wrapping_add(self.disp)
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("[")?;
        let default = if self.base == Some(Register::Bp) {
            Register::Ss
        } else {
            Register::Ds
        };
        if self.segment != default {
            write!(f, "{}:", self.segment.name().to_lowercase())?;
        }

        match (self.base, self.index) {
            (None, _) => write!(f, "0x{:04x}", self.disp)?,
            (Some(base), index) => {
                write!(f, "{}", base.name().to_lowercase())?;
                if let Some(index) = index {
                    write!(f, "+{}", index.name().to_lowercase())?;
                }
                let disp = self.disp as i16;
                if disp > 0 {
                    write!(f, "+0x{:x}", disp)?;
                } else if disp < 0 {
                    write!(f, "-0x{:x}", -i32::from(disp))?;
                }
            }
        }

        f.write_str("]")
    }
}

/// A decoded operand.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Arg {
    Reg(Register),
    Reg8(ByteRegister),
    Mem(MemoryLocation),
    Imm8(u8),
    Imm16(u16),
    /// Jump displacement, relative to the end of the instruction.
    Rel8(i8),
    Rel16(i16),
    /// A `segment:offset` pointer.
    Far { segment: u16, offset: u16 },
}

/// A fully decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    /// Address of the first byte, including prefixes.
    pub address: u32,
    /// Length in bytes, including prefixes.
    pub len: u32,
    /// The primary opcode byte.
    pub opcode: u8,
    /// The group selector, if the opcode dispatches into a group.
    pub selector: Option<u8>,
    pub mnemonic: String,
    pub handler: HandlerId,
    /// Operands, in slot order.
    pub args: Vec<Arg>,
    pub prefixes: Prefixes,
    /// Mnemonic of the repeat prefix, if any.
    pub repeat: Option<String>,
}

impl Instr {
    /// Address of the instruction following this one.
    pub fn next_address(&self) -> u32 {
        self.address.wrapping_add(self.len)
    }

    /// Resolves the target of a relative jump operand.
    pub fn jump_target(&self, arg: &Arg) -> Option<u32> {
        let rel = match *arg {
            Arg::Rel8(rel) => i32::from(rel),
            Arg::Rel16(rel) => i32::from(rel),
            _ => return None,
        };
        Some(self.next_address().wrapping_add(rel as u32))
    }
}

/// Prints the instruction in Intel syntax, with jump targets resolved.
impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(rep) = &self.repeat {
            write!(f, "{} ", rep.to_lowercase())?;
        }
        f.write_str(&self.mnemonic.to_lowercase())?;

        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { "," })?;
            match *arg {
                Arg::Reg(reg) => f.write_str(&reg.name().to_lowercase())?,
                Arg::Reg8(reg) => f.write_str(&reg.name().to_lowercase())?,
                Arg::Mem(mem) => write!(f, "{}", mem)?,
                Arg::Imm8(imm) => write!(f, "0x{:x}", imm)?,
                Arg::Imm16(imm) => write!(f, "0x{:x}", imm)?,
                Arg::Rel8(_) | Arg::Rel16(_) => {
                    let target = self.jump_target(arg).unwrap_or(0);
                    write!(f, "0x{:08X}", target)?
                }
                Arg::Far { segment, offset } => write!(f, "0x{:04x}:0x{:04x}", segment, offset)?,
            }
        }

        Ok(())
    }
}

/// Error type returned by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    /// The opcode has no entry in the table.
    InvalidOpcode { opcode: u8, address: u32 },
    /// The `Reg` field selects an undefined member of a group.
    InvalidGroupSelector { opcode: u8, selector: u8, address: u32 },
    /// The input ended in the middle of an instruction.
    Truncated { address: u32 },
    /// Undefined operand encoding.
    Undefined(String),
}

impl DecoderError {
    #[cold]
    pub(crate) fn ud<S: AsRef<str>>(why: S) -> Self {
        DecoderError::Undefined(why.as_ref().to_string())
    }

    /// Address of the instruction that failed to decode, if known.
    pub fn address(&self) -> Option<u32> {
        match *self {
            DecoderError::InvalidOpcode { address, .. }
            | DecoderError::InvalidGroupSelector { address, .. }
            | DecoderError::Truncated { address } => Some(address),
            DecoderError::Undefined(_) => None,
        }
    }
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecoderError::InvalidOpcode { opcode, address } => {
                write!(f, "invalid opcode {:#04X} at {:#010X}", opcode, address)
            }
            DecoderError::InvalidGroupSelector { opcode, selector, address } => write!(
                f,
                "invalid opcode {:#04X}/{} at {:#010X}",
                opcode, selector, address
            ),
            DecoderError::Truncated { address } => {
                write!(f, "instruction at {:#010X} is truncated", address)
            }
            DecoderError::Undefined(why) => write!(f, "undefined instruction: {}", why),
        }
    }
}

impl ::std::error::Error for DecoderError {}
