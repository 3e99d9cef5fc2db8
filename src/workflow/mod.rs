// Workflow orchestration - five gated steps, each driven by its own controller
pub mod analysis;
pub mod image_gen;
pub mod job;
pub mod proposal;
pub mod session;
pub mod slots;
pub mod state;
pub mod upload;
pub mod video_gen;

#[cfg(test)]
pub(crate) mod testing;

pub use session::{RunSnapshot, Session, SessionStore, SharedSession, StepView};
pub use state::{ActiveStep, Workflow};
pub use upload::{ImageInput, UploadForm, UploadOutput};
