//! AWS stacks for StackFlow
//!
//! Three stacks across two regions: certificate and hosted zone in the CDN's
//! certificate region, the static frontend and the application backend in
//! the application region.

pub mod backend;
pub mod certificate;
pub mod error;
pub mod frontend;
pub mod profile;
pub mod synth;

#[cfg(test)]
mod testing;

pub use backend::build_backend_graph;
pub use certificate::build_certificate_graph;
pub use error::{Result, SynthError};
pub use frontend::build_frontend_graph;
pub use profile::{provision_profile, runtime_inputs};
pub use synth::{SecretBundle, Synthesis, Synthesizer};
