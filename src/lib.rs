//! Compiles 8086-style opcode tables into decode-and-dispatch code.
//!
//! An opcode table lists every primary opcode and opcode group member
//! together with its mnemonic and operand specifiers (see `compiler::table`
//! for the format). The compiler turns it into:
//!
//! * a `DispatchTree` describing, per opcode byte, which operands to fetch
//!   and which handler to call, and
//! * a `HandlerRegistry` holding one handler per mnemonic and operand width.
//!
//! Both can be rendered as Rust source and spliced into templates
//! (`template`), or used directly to decode and execute machine code
//! (`runtime`).

#![doc(html_root_url = "https://docs.rs/dispatchgen/0.1.0")]
#![warn(missing_debug_implementations)]

#[macro_use] extern crate bitflags;
#[macro_use] extern crate bitpat;
#[macro_use] extern crate log;
#[macro_use] extern crate num_derive;
extern crate num_traits;

pub mod compiler;
pub mod runtime;
pub mod template;
