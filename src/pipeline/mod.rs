//! Pipeline stages for ensemble receipt extraction.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own with a scripted provider.
//!
//! ## Data Flow
//!
//! ```text
//! image ──▶ extract ×N ──▶ compare ──▶ select
//! (bytes)    (VLMs)        (group)     (judge)
//! ```
//!
//! 1. [`image`]   — read the receipt, resolve its media type, build the data URL
//! 2. [`extract`] — one vision-model call per configured backend
//! 3. [`compare`] — normalise candidates for grouping and winner attribution
//! 4. [`select`]  — render the numbered options and ask the judge

pub mod compare;
pub mod extract;
pub mod image;
pub mod select;
