mod backend;
mod backends;
mod detector;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::{TractBackend, TractConfig};
pub use detector::{extract_recognized, Detector};
pub use registry::BackendRegistry;
pub use result::{ClassLabel, Observation, RawDetection, RecognizedObject};
