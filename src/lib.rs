//! CHTML: component templates written as an HTML superset, rendered
//! against scoped variables, plus a file based router and the pieces
//! of a development server.

pub mod warn;
pub mod dt;
pub mod boxed_error;
pub mod easy_fs;
pub mod cmpfilemeta;

pub mod source;
pub mod ident;
pub mod value;
pub mod shape;
pub mod template;
pub mod elements;
pub mod node;
pub mod html;
pub mod error;
pub mod expr;
pub mod tokenizer;
pub mod parser;

pub mod notify;
pub mod scope;
pub mod component;
pub mod interp;
pub mod loader;
pub mod boundary;
pub mod poller;
pub mod session;

pub mod router;
pub mod config;
pub mod serve;
