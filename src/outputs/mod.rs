//! Output rendering for the Markdown artifacts.
//!
//! # Submodules
//!
//! - [`markdown`]: front matter rendering and the post-processing applied to
//!   model-generated Markdown
//!
//! Writing the rendered documents is the artifact store's job; nothing in
//! here touches the file system.

pub mod markdown;
