use std::fmt::Display;

use ns_core::NsError;

fn map_error(code: &'static str, error: impl Display) -> NsError {
    NsError::new(code, error.to_string())
}

pub(crate) fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

pub(crate) fn emit_error(error: NsError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    1
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> NsError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: std::path::StripPrefixError) -> NsError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> NsError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_output_write(error: std::io::Error) -> NsError {
    map_error("CLI_OUTPUT_WRITE", error)
}

pub(crate) fn map_cli_json(error: serde_json::Error) -> NsError {
    map_error("CLI_JSON", error)
}
