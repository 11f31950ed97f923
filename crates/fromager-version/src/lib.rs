//! Version and requirement model: PEP 440 versions/specifiers and PEP 508
//! requirements (plus the direct-URL extension Fromager needs for git
//! sources at the top level).

mod marker;
mod requirement;
mod specifier;
mod version;

pub use marker::{MarkerEnvironment, MarkerParseError, MarkerTree};
pub use requirement::{DirectUrl, DirectUrlScheme, InvalidRequirement, Requirement};
pub use specifier::{Operator, SpecifierParseError, VersionSpecifier, VersionSpecifiers};
pub use version::{LocalSegment, PrereleaseKind, Version, VersionParseError};
