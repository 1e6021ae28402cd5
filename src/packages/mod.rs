//! Package-manager backends behind one contract.

pub mod apk;
pub mod context;
pub mod dpkg;
pub(crate) mod flow;
pub mod null;
pub mod pacman;
pub mod registry;
pub mod resolve;
pub mod spec;
pub mod traits;

pub use context::BackendContext;
pub use registry::{BackendKind, BackendRegistry, create_backend};
pub use spec::PackageSpec;
pub use traits::{InstallOutcome, PackageBackend, PurgeOutcome};
