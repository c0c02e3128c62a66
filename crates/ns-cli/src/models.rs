use ns_core::{decode_all, NsError, NsxModule};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModuleDump {
    pub(crate) name: String,
    pub(crate) imports: Vec<String>,
    pub(crate) strings: Vec<String>,
    pub(crate) subroutines: Vec<SubroutineDump>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubroutineDump {
    pub(crate) index: u16,
    pub(crate) kind: &'static str,
    pub(crate) name: String,
    pub(crate) parameters: Vec<String>,
    pub(crate) dialogue_blocks: Vec<DialogueBlockDump>,
    pub(crate) code: Vec<InstructionDump>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DialogueBlockDump {
    pub(crate) name: String,
    pub(crate) offset: u16,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct InstructionDump {
    pub(crate) offset: usize,
    pub(crate) op: String,
}

impl ModuleDump {
    pub(crate) fn from_module(module: &NsxModule) -> Result<Self, NsError> {
        let mut strings = Vec::with_capacity(module.string_count());
        for token in 0..module.string_count() as u16 {
            strings.push(module.string(token)?.to_string());
        }

        let mut subroutines = Vec::with_capacity(module.subroutine_count());
        for index in 0..module.subroutine_count() as u16 {
            let entry = module.rti(index)?;
            let body = module.subroutine(index)?;
            let dialogue_blocks = entry
                .dialogue_blocks
                .iter()
                .zip(&body.dialogue_block_offsets)
                .map(|(name, offset)| DialogueBlockDump {
                    name: name.clone(),
                    offset: *offset,
                })
                .collect();
            let code = decode_all(&body.code)?
                .into_iter()
                .map(|(offset, op)| InstructionDump {
                    offset,
                    op: op.to_string(),
                })
                .collect();
            subroutines.push(SubroutineDump {
                index,
                kind: entry.kind.keyword(),
                name: entry.name.clone(),
                parameters: module.parameter_names(index)?.to_vec(),
                dialogue_blocks,
                code,
            });
        }

        Ok(Self {
            name: module.name().to_string(),
            imports: module.imports().to_vec(),
            strings,
            subroutines,
        })
    }
}
