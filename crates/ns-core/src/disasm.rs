use std::fmt::Write;

use crate::builtins::{builtin_decl, BuiltInId};
use crate::error::NsError;
use crate::module::NsxModule;
use crate::opcode::{Immediate, Opcode};

/// Decodes a code buffer into `(offset, instruction)` pairs.
pub fn decode_all(code: &[u8]) -> Result<Vec<(usize, Opcode)>, NsError> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let (op, len) = Opcode::decode(code, offset)?;
        out.push((offset, op));
        offset += len;
    }
    Ok(out)
}

pub fn disassemble(module: &NsxModule) -> Result<String, NsError> {
    let mut text = String::new();
    let _ = writeln!(text, "module {}", module.name());
    for (index, import) in module.imports().iter().enumerate() {
        let _ = writeln!(text, "import {} {}", index, import);
    }
    for index in 0..module.subroutine_count() as u16 {
        let entry = module.rti(index)?;
        let params = module.parameter_names(index)?.join(", ");
        let _ = writeln!(
            text,
            "\n{} {} {}({})",
            index,
            entry.kind.keyword(),
            entry.name,
            params
        );
        let body = module.subroutine(index)?;
        for (block, offset) in entry.dialogue_blocks.iter().zip(&body.dialogue_block_offsets) {
            let _ = writeln!(text, "  .dialogue {} @{:04}", block, offset);
        }
        for (offset, op) in decode_all(&body.code)? {
            let _ = writeln!(text, "  {:04}  {}{}", offset, op, annotate(module, &op, offset));
        }
    }
    Ok(text)
}

fn annotate(module: &NsxModule, op: &Opcode, offset: usize) -> String {
    let string = |token: u16| {
        module
            .string(token)
            .map(|value| format!("  ; {:?}", value))
            .unwrap_or_default()
    };
    match *op {
        Opcode::LoadImm(Immediate::String(token))
        | Opcode::LoadVar(token)
        | Opcode::StoreVar(token)
        | Opcode::PresentText(token)
        | Opcode::IsPressed(token)
        | Opcode::Trap(token) => string(token),
        Opcode::Jump(delta) | Opcode::JumpIfTrue(delta) | Opcode::JumpIfFalse(delta) => {
            let target = (offset + op.encoded_len()) as i64 + i64::from(delta);
            format!("  ; -> {:04}", target)
        }
        Opcode::Call(index) => module
            .rti(index)
            .map(|entry| format!("  ; {}", entry.name))
            .unwrap_or_default(),
        Opcode::CallFar { import, subroutine } => module
            .import(import)
            .map(|name| format!("  ; {}#{}", name, subroutine))
            .unwrap_or_default(),
        Opcode::Dispatch { builtin, .. } => builtin_decl(BuiltInId(builtin))
            .map(|decl| format!("  ; {}", decl.name))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod disasm_tests {
    use super::*;
    use crate::module::{ModuleBuilder, SubroutineDef};
    use crate::types::SubroutineKind;

    #[test]
    fn listing_names_subroutines_and_strings() {
        let mut builder = ModuleBuilder::new();
        let token = builder.intern_string("$score").expect("intern");
        let mut code = Vec::new();
        Opcode::LoadVar(token).encode(&mut code);
        Opcode::Pop.encode(&mut code);
        Opcode::Dispatch { builtin: 0, argc: 1 }.encode(&mut code);
        Opcode::Return.encode(&mut code);
        builder
            .push_subroutine(SubroutineDef {
                kind: SubroutineKind::Function,
                name: "Test".to_string(),
                parameters: vec!["$a".to_string()],
                dialogue_blocks: Vec::new(),
                code,
            })
            .expect("push");
        let module =
            NsxModule::from_bytes("t.nss", builder.write().expect("write")).expect("load");

        let listing = disassemble(&module).expect("disassemble");
        assert!(listing.contains("0 function Test($a)"));
        assert!(listing.contains("LoadVar str#0  ; \"$score\""));
        assert!(listing.contains("Dispatch 0/1  ; Wait"));
    }

    #[test]
    fn decode_all_stops_on_garbage() {
        let error = decode_all(&[0x16, 0xff]).expect_err("garbage should fail");
        assert_eq!(error.code, "VM_UNREACHABLE_OPCODE");
    }
}
