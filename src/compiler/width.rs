//! Handler name suffixes derived from operand widths.

use compiler::operand::{OperandSpecifier, Width};

use std::{error, fmt};

/// The width suffix of a handler name, like the `wb` in `SHL_wb`.
///
/// Adjacent duplicate widths are collapsed, so `Ev Gv` yields `w`, while
/// `Ev Ib` yields `wb`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Suffix(Vec<Width>);

impl Suffix {
    pub fn empty() -> Self {
        Suffix(Vec::new())
    }

    fn push(&mut self, width: Width) {
        if self.0.last() != Some(&width) {
            self.0.push(width);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Prints the suffix including the leading underscore, or nothing if the
/// suffix is empty.
impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }

        f.write_str("_")?;
        for width in &self.0 {
            write!(f, "{}", width.tag())?;
        }
        Ok(())
    }
}

/// Computes the width suffix of an operand list.
///
/// Literal constants contribute a byte width unless a wider operand precedes
/// them (`INT 3` is `INT_b`, `SHL Ev 1` is `SHL_w`).
///
/// Fails when a non-empty operand list does not yield any width.
pub fn resolve(operands: &[OperandSpecifier]) -> Result<Suffix, WidthError> {
    let mut suffix = Suffix::empty();

    for op in operands {
        match (op, op.width()) {
            (_, Some(width)) => suffix.push(width),
            (OperandSpecifier::Constant(_), None) => {
                let sized = suffix.0.iter().any(|&w| w != Width::Byte);
                if !sized {
                    suffix.push(Width::Byte);
                }
            }
            _ => {}
        }
    }

    if !operands.is_empty() && suffix.is_empty() {
        return Err(WidthError {
            operands: operands.to_vec(),
        });
    }

    Ok(suffix)
}

/// No width could be derived from a non-empty operand list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidthError {
    pub operands: Vec<OperandSpecifier>,
}

impl fmt::Display for WidthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("cannot determine operand width of")?;
        for op in &self.operands {
            write!(f, " {}", op)?;
        }
        Ok(())
    }
}

impl error::Error for WidthError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix(ops: &[&str]) -> String {
        let ops = ops
            .iter()
            .map(|tok| OperandSpecifier::parse(tok).unwrap())
            .collect::<Vec<_>>();
        resolve(&ops).unwrap().to_string()
    }

    #[test]
    fn suffixes() {
        assert_eq!(suffix(&[]), "");
        assert_eq!(suffix(&["Eb", "Gb"]), "_b");
        assert_eq!(suffix(&["Ev", "Gv"]), "_w");
        assert_eq!(suffix(&["eAX", "Iv"]), "_w");
        assert_eq!(suffix(&["Ev", "Ib"]), "_wb");
        assert_eq!(suffix(&["Ev", "CL"]), "_wb");
        assert_eq!(suffix(&["AL", "DX"]), "_bw");
        assert_eq!(suffix(&["Gv", "Mp"]), "_wp");
        assert_eq!(suffix(&["Ap"]), "_p");
        assert_eq!(suffix(&["Jb"]), "_b");
        assert_eq!(suffix(&["ES"]), "_w");
    }

    #[test]
    fn constants() {
        assert_eq!(suffix(&["3"]), "_b");
        assert_eq!(suffix(&["Eb", "1"]), "_b");
        assert_eq!(suffix(&["Ev", "1"]), "_w");
    }

    #[test]
    fn untyped_memory() {
        assert_eq!(suffix(&["Gv", "M"]), "_w");
        let err = resolve(&[OperandSpecifier::Memory]).unwrap_err();
        assert_eq!(err.operands, vec![OperandSpecifier::Memory]);
        assert_eq!(err.to_string(), "cannot determine operand width of M");
    }
}
