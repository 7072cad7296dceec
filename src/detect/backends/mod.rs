pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubEngine, StubProbe};

#[cfg(feature = "backend-tract")]
pub use tract::TractEngine;
