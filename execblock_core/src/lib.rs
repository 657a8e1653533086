//! `execblock_core` is the core library for the execblock markdown
//! preprocessor. It finds executable code blocks in markdown documents,
//! caches their source by content hash, and renders each block together with
//! the output captured the last time the snippet was run.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Markdown document
//!   → Directive parser (finds fenced blocks named after a directive, lexes their options)
//!   → Registries (header and filter directives accumulate shared state)
//!   → Block renderer (hidden lines, headers, hashing, cache lookup, filters)
//!   → Document builder (splices rendered blocks back into the document)
//!   → Runner (executes cached inputs that have no output yet)
//! ```
//!
//! ## Directives
//!
//! Directives are fenced code blocks whose info string starts with a
//! directive name:
//!
//! ````md
//! ```exec-block-add-header python
//! import math
//! ```
//!
//! ```exec-block python linenos emphasize-lines="2"
//! x = math.sqrt(16)
//! print(x)
//! ```
//! ````
//!
//! - `exec-block <lang>`: show the code and its cached output.
//! - `output-block <lang>`: show only the cached output.
//! - `exec-block-add-header <lang>`: prepend lines to every later block of
//!   the language before hashing and running it.
//! - `exec-block-add-filter`: strip a literal string from every later output.
//!
//! Lines containing ` [hidden]` run but are not displayed.
//!
//! ## Snippet Cache
//!
//! Every block writes its full source to `<cache_dir>/<sha256>.<lang>.in`.
//! The output shown for the block is read from the sibling `.out` file,
//! which `execblock run` (or any external tool) produces. A block without an
//! output renders `(Output not available)`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use execblock_core::ProjectContext;
//! use execblock_core::build_project;
//! use execblock_core::write_build;
//! use std::path::Path;
//!
//! let ctx = ProjectContext::load(Path::new(".")).unwrap();
//! let result = build_project(&ctx).unwrap();
//!
//! for (file, block) in result.missing_outputs() {
//!     eprintln!("{}:{} has not been run yet", file.display(), block.line);
//! }
//!
//! write_build(&ctx, &result).unwrap();
//! ```

pub use cache::*;
pub use config::*;
pub use directive::*;
pub use document::*;
pub use error::*;
pub use filters::*;
pub use headers::*;
pub use position::*;
pub use project::*;
pub use renderer::*;
pub use runner::*;

pub mod cache;
pub mod config;
mod directive;
mod document;
#[allow(unused_assignments)]
mod error;
mod filters;
mod headers;
pub(crate) mod lexer;
mod position;
pub mod project;
mod renderer;
mod runner;
pub mod text;

#[cfg(test)]
mod __tests;
