//! Operand specifiers and the registers they can name.
//!
//! The vocabulary follows the usual opcode map notation: an uppercase letter
//! names the addressing method and a lowercase letter (or `0`) names the
//! operand type. Since the tables describe a 16-bit machine, `v` always means
//! a word.

use num_traits::FromPrimitive;

use std::fmt;

/// A 16-bit register, including the segment registers.
///
/// General purpose registers use their Mod-Reg-R/M encoding as discriminant,
/// segment registers follow at `8 + sreg`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
pub enum Register {
    Ax = 0,
    Cx = 1,
    Dx = 2,
    Bx = 3,
    Sp = 4,
    Bp = 5,
    Si = 6,
    Di = 7,
    Es = 8,
    Cs = 9,
    Ss = 10,
    Ds = 11,
}

impl Register {
    /// Looks up a register by its table name (`AX`, `CS`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        use self::Register::*;

        Some(match name {
            "AX" => Ax,
            "CX" => Cx,
            "DX" => Dx,
            "BX" => Bx,
            "SP" => Sp,
            "BP" => Bp,
            "SI" => Si,
            "DI" => Di,
            "ES" => Es,
            "CS" => Cs,
            "SS" => Ss,
            "DS" => Ds,
            _ => return None,
        })
    }

    /// Converts the 3-bit `Reg` or `R/M` encoding of a general purpose
    /// register.
    pub fn from_encoding(bits: u8) -> Self {
        Register::from_u8(bits & 0b111)
            .expect("couldn't turn 3-bit u8 into Register")
    }

    /// Converts the `Reg` field of an instruction operating on a segment
    /// register. Only the low 2 bits are significant on the 8086.
    pub fn segment_from_encoding(bits: u8) -> Self {
        Register::from_u8(8 + (bits & 0b11))
            .expect("couldn't turn 2-bit u8 into segment Register")
    }

    pub fn name(&self) -> &'static str {
        use self::Register::*;

        match self {
            Ax => "AX",
            Cx => "CX",
            Dx => "DX",
            Bx => "BX",
            Sp => "SP",
            Bp => "BP",
            Si => "SI",
            Di => "DI",
            Es => "ES",
            Cs => "CS",
            Ss => "SS",
            Ds => "DS",
        }
    }

    /// Returns the identifier of the variant, as used in generated code.
    pub fn variant(&self) -> &'static str {
        use self::Register::*;

        match self {
            Ax => "Ax",
            Cx => "Cx",
            Dx => "Dx",
            Bx => "Bx",
            Sp => "Sp",
            Bp => "Bp",
            Si => "Si",
            Di => "Di",
            Es => "Es",
            Cs => "Cs",
            Ss => "Ss",
            Ds => "Ds",
        }
    }

    pub fn is_segment(&self) -> bool {
        *self as u8 >= 8
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An 8-bit register, numbered by its Mod-Reg-R/M encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
pub enum ByteRegister {
    Al = 0,
    Cl = 1,
    Dl = 2,
    Bl = 3,
    Ah = 4,
    Ch = 5,
    Dh = 6,
    Bh = 7,
}

impl ByteRegister {
    pub fn from_name(name: &str) -> Option<Self> {
        use self::ByteRegister::*;

        Some(match name {
            "AL" => Al,
            "CL" => Cl,
            "DL" => Dl,
            "BL" => Bl,
            "AH" => Ah,
            "CH" => Ch,
            "DH" => Dh,
            "BH" => Bh,
            _ => return None,
        })
    }

    pub fn from_encoding(bits: u8) -> Self {
        ByteRegister::from_u8(bits & 0b111)
            .expect("couldn't turn 3-bit u8 into ByteRegister")
    }

    pub fn name(&self) -> &'static str {
        use self::ByteRegister::*;

        match self {
            Al => "AL",
            Cl => "CL",
            Dl => "DL",
            Bl => "BL",
            Ah => "AH",
            Ch => "CH",
            Dh => "DH",
            Bh => "BH",
        }
    }

    pub fn variant(&self) -> &'static str {
        use self::ByteRegister::*;

        match self {
            Al => "Al",
            Cl => "Cl",
            Dl => "Dl",
            Bl => "Bl",
            Ah => "Ah",
            Ch => "Ch",
            Dh => "Dh",
            Bh => "Bh",
        }
    }
}

impl fmt::Display for ByteRegister {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The width of an operand, as far as handler naming and fetch sizes are
/// concerned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    /// 8 bits (`b`).
    Byte,
    /// 16 bits (`w`, `v`).
    Word,
    /// 32-bit `segment:offset` pointer (`p`).
    Far,
}

impl Width {
    /// The letter used for this width in handler name suffixes.
    pub fn tag(&self) -> char {
        match self {
            Width::Byte => 'b',
            Width::Word => 'w',
            Width::Far => 'p',
        }
    }

    fn from_type(c: char) -> Option<Self> {
        Some(match c {
            'b' | '0' => Width::Byte,
            'w' | 'v' => Width::Word,
            'p' => Width::Far,
            _ => return None,
        })
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Width::Byte => "byte",
            Width::Word => "word",
            Width::Far => "far",
        })
    }
}

/// Specifies where an instruction's operand comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OperandSpecifier {
    /// A fixed 16-bit register (`AX`, `ES`, or the historical `eAX` form).
    Register(Register),
    /// A fixed 8-bit register (`AL`).
    ByteRegister(ByteRegister),
    /// `E` - The Mod and R/M fields of the Mod-Reg-R/M byte select a register
    /// or a memory location.
    RegMem(Width),
    /// `G` - The `Reg` field of the Mod-Reg-R/M byte selects a general
    /// register.
    Reg(Width),
    /// `Sw` - The `Reg` field of the Mod-Reg-R/M byte selects a segment
    /// register.
    Segment,
    /// `I` - The operand value is encoded in the following bytes.
    Immediate(Width),
    /// `J` - A signed offset relative to the next instruction follows.
    Relative(Width),
    /// `O` - A 16-bit offset of a memory operand follows. No Mod-Reg-R/M byte
    /// is used.
    Offset(Width),
    /// `1` or `3` - A literal used by shift and interrupt instructions.
    Constant(u8),
    /// `Ap` - A `segment:offset` pointer follows the opcode.
    FarImmediate,
    /// `Mp` - The Mod-Reg-R/M byte refers to a `segment:offset` pointer in
    /// memory.
    FarMemory,
    /// `M` - The Mod-Reg-R/M byte may only refer to memory. The operand type
    /// does not matter (`LEA` only computes the address).
    Memory,
}

impl OperandSpecifier {
    /// Parses an operand token of the table.
    ///
    /// Returns `None` if the token is not part of the vocabulary.
    pub fn parse(token: &str) -> Option<Self> {
        // eAX => AX, etc.
        let token = if token.starts_with('e') && Register::from_name(&token[1..]).is_some() {
            &token[1..]
        } else {
            token
        };

        if let Some(reg) = Register::from_name(token) {
            return Some(OperandSpecifier::Register(reg));
        }
        if let Some(reg) = ByteRegister::from_name(token) {
            return Some(OperandSpecifier::ByteRegister(reg));
        }

        use self::OperandSpecifier::{
            Constant, FarImmediate, FarMemory, Immediate, Memory, Offset, Reg, RegMem, Relative,
            Segment,
        };

        match token {
            "1" => return Some(Constant(1)),
            "3" => return Some(Constant(3)),
            "M" => return Some(Memory),
            _ => {}
        }

        let mut chars = token.chars();
        let (method, ty) = match (chars.next(), chars.next(), chars.next()) {
            (Some(method), Some(ty), None) => (method, Width::from_type(ty)?),
            _ => return None,
        };

        Some(match (method, ty) {
            ('E', Width::Far) | ('G', Width::Far) | ('I', Width::Far)
            | ('J', Width::Far) | ('O', Width::Far) => return None,
            ('E', width) => RegMem(width),
            ('G', width) => Reg(width),
            ('S', Width::Word) => Segment,
            ('I', width) => Immediate(width),
            ('J', width) => Relative(width),
            ('O', width) => Offset(width),
            ('A', Width::Far) => FarImmediate,
            ('M', Width::Far) => FarMemory,
            _ => return None,
        })
    }

    /// The width this operand contributes to the handler name.
    ///
    /// Literal constants and untyped memory operands return `None`; the
    /// former are handled specially by the width resolver.
    pub fn width(&self) -> Option<Width> {
        use self::OperandSpecifier::*;

        match *self {
            Register(_) | Segment => Some(Width::Word),
            ByteRegister(_) => Some(Width::Byte),
            RegMem(w) | Reg(w) | Immediate(w) | Relative(w) | Offset(w) => Some(w),
            FarImmediate | FarMemory => Some(Width::Far),
            Constant(_) | Memory => None,
        }
    }

    /// Whether fetching this operand requires the Mod-Reg-R/M byte.
    pub fn needs_modrm(&self) -> bool {
        use self::OperandSpecifier::*;

        match self {
            RegMem(_) | Reg(_) | Segment | FarMemory | Memory => true,
            Register(_) | ByteRegister(_) | Immediate(_) | Relative(_) | Offset(_)
            | Constant(_) | FarImmediate => false,
        }
    }
}

/// Prints the canonical token of the operand.
impl fmt::Display for OperandSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::OperandSpecifier::*;

        fn ty(w: Width) -> char {
            match w {
                Width::Word => 'v',
                other => other.tag(),
            }
        }

        match *self {
            Register(reg) => f.write_str(reg.name()),
            ByteRegister(reg) => f.write_str(reg.name()),
            RegMem(w) => write!(f, "E{}", ty(w)),
            Reg(w) => write!(f, "G{}", ty(w)),
            Segment => f.write_str("Sw"),
            Immediate(w) => write!(f, "I{}", ty(w)),
            Relative(w) => write!(f, "J{}", ty(w)),
            Offset(w) => write!(f, "O{}", ty(w)),
            Constant(n) => write!(f, "{}", n),
            FarImmediate => f.write_str("Ap"),
            FarMemory => f.write_str("Mp"),
            Memory => f.write_str("M"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::OperandSpecifier::*;

    fn parse(token: &str) -> OperandSpecifier {
        OperandSpecifier::parse(token).unwrap()
    }

    #[test]
    fn vocabulary() {
        assert_eq!(parse("AX"), Register(super::Register::Ax));
        assert_eq!(parse("eAX"), Register(super::Register::Ax));
        assert_eq!(parse("eSI"), Register(super::Register::Si));
        assert_eq!(parse("ES"), Register(super::Register::Es));
        assert_eq!(parse("CL"), ByteRegister(super::ByteRegister::Cl));
        assert_eq!(parse("Eb"), RegMem(Width::Byte));
        assert_eq!(parse("Ew"), RegMem(Width::Word));
        assert_eq!(parse("Ev"), RegMem(Width::Word));
        assert_eq!(parse("Gb"), Reg(Width::Byte));
        assert_eq!(parse("Sw"), Segment);
        assert_eq!(parse("I0"), Immediate(Width::Byte));
        assert_eq!(parse("Iv"), Immediate(Width::Word));
        assert_eq!(parse("Jb"), Relative(Width::Byte));
        assert_eq!(parse("Ov"), Offset(Width::Word));
        assert_eq!(parse("1"), Constant(1));
        assert_eq!(parse("3"), Constant(3));
        assert_eq!(parse("Ap"), FarImmediate);
        assert_eq!(parse("Mp"), FarMemory);
        assert_eq!(parse("M"), Memory);
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert_eq!(OperandSpecifier::parse("eAL"), None);
        assert_eq!(OperandSpecifier::parse("Ep"), None);
        assert_eq!(OperandSpecifier::parse("Sb"), None);
        assert_eq!(OperandSpecifier::parse("Xb"), None);
        assert_eq!(OperandSpecifier::parse("2"), None);
        assert_eq!(OperandSpecifier::parse("Ebx"), None);
        assert_eq!(OperandSpecifier::parse(""), None);
    }

    #[test]
    fn encodings() {
        assert_eq!(super::Register::from_encoding(0b011), super::Register::Bx);
        assert_eq!(super::Register::from_encoding(0b100), super::Register::Sp);
        assert_eq!(super::Register::segment_from_encoding(0b01), super::Register::Cs);
        assert_eq!(super::Register::segment_from_encoding(0b111), super::Register::Ds);
        assert_eq!(super::ByteRegister::from_encoding(0b100), super::ByteRegister::Ah);
        assert!(super::Register::Ss.is_segment());
        assert!(!super::Register::Di.is_segment());
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(parse("eAX").to_string(), "AX");
        assert_eq!(parse("Ew").to_string(), "Ev");
        assert_eq!(parse("I0").to_string(), "Ib");
        assert_eq!(parse("Mp").to_string(), "Mp");
    }
}
