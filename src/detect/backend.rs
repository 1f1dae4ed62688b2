use crate::detect::result::Observation;
use crate::error::DetectorError;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is an opaque inference capability: pixels go in, observations
/// come out. Backends run on the inference worker thread, never on the
/// capture or render threads, so they must be `Send`.
///
/// Implementations MUST:
/// - Treat frame pixels as read-only
/// - Report observation boxes normalized with the origin at the bottom-left
/// - Return an empty list (not an error) when nothing is found
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Resolve model assets. Called once before the pipeline starts.
    ///
    /// Any error returned here is treated as a load failure.
    fn warm_up(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }

    /// Run inference on a single upright frame.
    fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>, DetectorError>;
}
