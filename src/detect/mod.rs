mod backend;
mod backends;
pub mod overlay;
mod result;

pub use backend::{DetectorLoader, LandmarkDetector};
pub use backends::{StubDetector, StubLoader};
pub use result::{FaceRect, LandmarkPoint};
