pub mod builtins;
pub mod disasm;
pub mod error;
pub mod module;
pub mod opcode;
pub mod types;
pub mod value;

pub use builtins::*;
pub use disasm::{decode_all, disassemble};
pub use error::NsError;
pub use module::*;
pub use opcode::{Immediate, Opcode};
pub use types::*;
pub use value::*;
