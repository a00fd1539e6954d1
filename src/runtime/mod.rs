//! Decoding and executing machine code with a compiled table.

mod prefix;
pub mod decode;
pub mod exec;

pub use self::decode::{Decoder, DecoderError, Instr};
pub use self::exec::{Executor, ExecError};
pub use self::prefix::{PrefixFlags, Prefixes};
