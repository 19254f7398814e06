//! # axml-patch
//!
//! A library for rewriting Android binary XML manifests.
//!
//! A manifest is decoded into a stream of [`android::Event`]s, passed through
//! a chain of rewrite stages and encoded back into binary XML. Nothing is
//! built into a DOM: each stage only sees events and keeps state for the
//! elements it cares about.
//!
//! # Examples
//!
//! ```no_run
//!  use axml_patch::{patch_manifest, rename_package};
//!
//!  let manifest = std::fs::read("AndroidManifest.xml").unwrap();
//!  let patched = patch_manifest(&manifest, "com.example.mod", "Example", true).unwrap();
//!  let renamed = rename_package(&patched, "com.example.resigned").unwrap();
//!  println!("{} bytes", renamed.len());
//! ```

pub mod android;
pub mod patcher;
#[cfg(test)]
mod tests;

pub use android::{axml_to_xml, AxmlError, AxmlResult};
pub use patcher::{patch_manifest, rename_package, ManifestPatcher, PlatformConfig};
