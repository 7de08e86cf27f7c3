// Submission intake: everything that happens to raw text before it reaches the
// quota gate or the analyzer. Pure functions except for PDF extraction, which
// is CPU-bound and runs inside tokio::task::spawn_blocking.

pub mod extract;
pub mod fingerprint;
pub mod identity;
pub mod normalize;

pub use fingerprint::{fingerprint, Fingerprint};
pub use identity::Identity;
pub use normalize::{normalize, NormalizedText};
