//! The opcode table compiler.

pub mod compile;
pub mod handler;
pub mod operand;
pub mod render;
pub mod table;
pub mod width;

pub use self::compile::{compile, compile_str, Compiled, CompileError, DispatchTree};
pub use self::handler::{Handler, HandlerId, HandlerRegistry};
pub use self::table::Table;
