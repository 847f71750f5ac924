//! Engine - The authoring-side document model.
//!
//! - **ComponentTree**: Block arena, parent pointers, ordered sibling lists
//! - **Project**: Pages (one tree each), the flow library, variable definitions
//!
//! # Architecture
//!
//! Blocks are NOT linked objects. They live in an arena keyed by id, and the
//! tree shape is two indexes over that arena:
//!
//! ```text
//! blocks:   { A: parent=None, B: parent=A, C: parent=A, D: parent=None }
//! children: { None: [A, D], A: [B, C] }
//! ```
//!
//! Every structural edit touches at most two sibling lists and one parent
//! pointer, and cycle checks are a walk up the parent chain.

mod project;
mod tree;

pub use project::*;
pub use tree::*;
