//! Pipeline stages for per-document metadata extraction.
//!
//! Each submodule implements one step, so each can be tested alone and
//! swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ download ──▶ extract ──▶ llm ──▶ parse
//! (classify)  (temp file)  (lopdf)    (model)  (JSON / key: value)
//! ```
//!
//! 1. [`source`]: classify a reference as one document or a library folder
//! 2. [`download`]: stream the document into a per-job temp directory
//! 3. [`extract`]: pull the text layer; runs in `spawn_blocking`
//! 4. [`llm`]: route the prompt to the right model backend with
//!    retry/backoff; the only stage that talks to a model
//! 5. [`parse`]: best-effort reply parsing with partial-match recovery
//!
//! [`pool`] runs these steps for many jobs at once.

pub mod download;
pub mod extract;
pub mod llm;
pub mod parse;
pub mod pool;
pub mod source;
