//! Shared value types and wire formats for pexr.
//!
//! Everything in this crate is pure data: parsing, normalization, ordering
//! and (de)serialization. No filesystem or network access happens here, so
//! the resolver, translators and bundle runtime in `pexr-core` can all be
//! tested against synthetic values.

pub mod artifact;
pub mod bundle;
pub mod hash;
pub mod markers;
pub mod platform;
pub mod requirement;
pub mod types;
pub mod version;

// Re-exports
pub use artifact::{Artifact, Location, PackageFormat};
pub use bundle::{
    BUNDLE_INFO_PATH, BuildProperties, BundleInfo, DEPS_DIR, EntryPoint, InvalidEntryPoint,
    RequirementEntry,
};
pub use hash::*;
pub use markers::{MarkerEnvironment, MarkerError, MarkerExpr};
pub use platform::{InterpreterIdentity, Platform, PlatformError, PlatformTag, TagValue, Target};
pub use requirement::{Requirement, RequirementError};
pub use types::*;
pub use version::{Operator, Version, VersionError, VersionSpecifier, VersionSpecifiers};

/// Magic bytes that open every zip local file header (`PK\x03\x04`).
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
