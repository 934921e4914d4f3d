//! codelibrarian-parsers: symbol and graph-edge extraction.
//!
//! Two strategies share one contract: a deep Python extractor with full
//! parameter/decorator/call coverage, and a grammar-driven generic extractor
//! configured by per-language node-type maps.

mod extractor;
mod generic;
mod languages;
mod parser;
mod python;

pub use extractor::SymbolExtractor;
pub use generic::{GenericExtractor, LangSpec};
pub use parser::{derive_module_name, CodeParser};
pub use python::PythonExtractor;
