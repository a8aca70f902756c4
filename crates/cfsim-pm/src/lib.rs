//! Template manager for cfsim.
//!
//! Renders the text the simulators send: commit file content, commit
//! messages and the comment-mode chat prompt. Built-in templates ship with
//! the crate; a directory of `.j2` / `.jinja` files can override them by name.

mod error;
mod manager;
mod template;

pub use error::PmError;
pub use manager::PromptManager;
pub use template::{
    COMMENT_CODE_BLOCK, COMMENT_SYSTEM, COMMENT_USER, COMMIT_CONTENT_PREFIX, COMMIT_MESSAGE,
    PromptTemplate,
};
