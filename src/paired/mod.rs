//! Still + video pairs cross-referenced by a shared identifier.

pub mod composer;
pub mod exif;
pub mod extract;
pub mod still;
