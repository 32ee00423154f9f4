pub mod config;
pub mod document;
pub mod lexer;
pub mod plugin_list;
