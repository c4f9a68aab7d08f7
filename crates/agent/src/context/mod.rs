//! Context management for the execution loop.
//!
//! | Piece | When | Effect |
//! |-------|------|--------|
//! | Assembler | every backend call | system + summary + history + overlay + user |
//! | Forced compression | context overflow | drop the older half of the body, synchronously |
//! | Summarizer | history past a size threshold | fold older messages into the summary, in the background |

pub mod assembler;
pub mod compression;
pub mod summarizer;
pub mod token;

pub use assembler::{AssemblyInput, ContextAssembler, DefaultAssembler, format_user_content};
pub use compression::{compress_session, force_compress};
pub use summarizer::{Summarizer, SummarizerSettings};
