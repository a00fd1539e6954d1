//! Prefix state collected while decoding an instruction.

use compiler::operand::Register;
use runtime::decode::DecoderError;

bitflags! {
    /// Bitmask of the prefixes seen before the current opcode.
    ///
    /// At most one segment override is active at a time. A later override
    /// replaces an earlier one.
    pub struct PrefixFlags: u8 {
        /// `ES:`
        const OVERRIDE_ES = 0x01;
        /// `CS:`
        const OVERRIDE_CS = 0x02;
        /// `SS:`
        const OVERRIDE_SS = 0x04;
        /// `DS:`
        const OVERRIDE_DS = 0x08;
        /// `REP`/`REPZ`/`REPNZ` and friends. The exact prefix is kept in
        /// `Prefixes::repeat`.
        const REPEAT = 0x10;

        const SEGMENT = Self::OVERRIDE_ES.bits
            | Self::OVERRIDE_CS.bits
            | Self::OVERRIDE_SS.bits
            | Self::OVERRIDE_DS.bits;
    }
}

impl PrefixFlags {
    fn from_segment(segment: Register) -> Option<Self> {
        Some(match segment {
            Register::Es => PrefixFlags::OVERRIDE_ES,
            Register::Cs => PrefixFlags::OVERRIDE_CS,
            Register::Ss => PrefixFlags::OVERRIDE_SS,
            Register::Ds => PrefixFlags::OVERRIDE_DS,
            _ => return None,
        })
    }

    fn segment(&self) -> Option<Register> {
        let seg = *self & PrefixFlags::SEGMENT;
        if seg == PrefixFlags::OVERRIDE_ES {
            Some(Register::Es)
        } else if seg == PrefixFlags::OVERRIDE_CS {
            Some(Register::Cs)
        } else if seg == PrefixFlags::OVERRIDE_SS {
            Some(Register::Ss)
        } else if seg == PrefixFlags::OVERRIDE_DS {
            Some(Register::Ds)
        } else {
            None
        }
    }
}

/// Prefixes applying to the instruction being decoded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Prefixes {
    flags: PrefixFlags,
    rep_opcode: Option<u8>,
}

impl Prefixes {
    pub fn empty() -> Self {
        Prefixes {
            flags: PrefixFlags::empty(),
            rep_opcode: None,
        }
    }

    pub fn flags(&self) -> PrefixFlags {
        self.flags
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Records a segment override, replacing any earlier one.
    ///
    /// Fails without touching the prefix state if `segment` is not a segment
    /// register.
    pub fn set_segment(&mut self, segment: Register) -> Result<(), DecoderError> {
        let flag = PrefixFlags::from_segment(segment)
            .ok_or_else(|| DecoderError::ud(format!("{} is not a segment register", segment)))?;
        self.flags.remove(PrefixFlags::SEGMENT);
        self.flags.insert(flag);
        Ok(())
    }

    /// The overriding segment register, if an override prefix was decoded.
    pub fn segment_override(&self) -> Option<Register> {
        self.flags.segment()
    }

    /// The segment to use for a memory operand whose default segment is
    /// `default`.
    pub fn segment(&self, default: Register) -> Register {
        self.segment_override().unwrap_or(default)
    }

    /// Records a repeat prefix by its opcode byte, replacing any earlier one.
    pub fn set_repeat(&mut self, opcode: u8) {
        self.flags.insert(PrefixFlags::REPEAT);
        self.rep_opcode = Some(opcode);
    }

    /// The opcode of the repeat prefix, if one was decoded.
    pub fn repeat(&self) -> Option<u8> {
        self.rep_opcode
    }
}

impl Default for Prefixes {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_override() {
        let mut p = Prefixes::empty();
        assert!(p.is_empty());
        assert_eq!(p.segment(Register::Ds), Register::Ds);

        p.set_segment(Register::Es).unwrap();
        assert_eq!(p.segment_override(), Some(Register::Es));
        assert_eq!(p.segment(Register::Ds), Register::Es);

        // later override wins
        p.set_segment(Register::Ss).unwrap();
        assert_eq!(p.segment_override(), Some(Register::Ss));
        assert_eq!(p.flags() & PrefixFlags::SEGMENT, PrefixFlags::OVERRIDE_SS);
    }

    #[test]
    fn repeat() {
        let mut p = Prefixes::empty();
        p.set_repeat(0xF2);
        p.set_repeat(0xF3);
        assert_eq!(p.repeat(), Some(0xF3));
        assert!(p.flags().contains(PrefixFlags::REPEAT));
        assert_eq!(p.segment_override(), None);
    }

    #[test]
    fn non_segment_override() {
        let mut p = Prefixes::empty();
        p.set_segment(Register::Cs).unwrap();
        assert_eq!(
            p.set_segment(Register::Ax),
            Err(DecoderError::Undefined("AX is not a segment register".to_string()))
        );
        assert_eq!(p.segment_override(), Some(Register::Cs));
    }
}
