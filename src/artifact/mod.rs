//! Build artifacts - the verity-protected root image and signed UKIs.
//!
//! - `squashfs` - Root image, hash device and root hash
//! - `uki` - Boot executable assembly, signing and slot read-back

pub mod squashfs;
pub mod uki;

pub use squashfs::{build_image, slot_image_path, verity_image_path};
pub use uki::{build_and_sign_kernel, classify, sign, KernelImage, SlotOwnership};
