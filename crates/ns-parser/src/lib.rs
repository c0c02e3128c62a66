pub mod ast;
pub mod lexer;
pub mod markup;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::{is_sigiled_identifier, tokenize, tokenize_all, Lexer};
pub use markup::{parse_markup, plain_text, MarkupElement, MarkupNode};
pub use parser::{
    parse_dialogue_block, parse_expression, parse_source_file, parse_statement, ParseResult,
    Parser,
};
pub use token::{Token, TokenKind, TokenValue};
