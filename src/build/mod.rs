//! Build orchestration.
//!
//! - `context`: collaborators and derived paths for one run
//! - `image`: the full build, from root image to installed executables
//! - `list`: on-disk state of every variant

pub mod context;
pub mod image;
pub mod list;

pub use context::BuildContext;
pub use image::{create_image_and_sign_kernel, BuildSummary, InstalledVariant};
pub use list::{list_variants, VariantState, VariantStatus};
