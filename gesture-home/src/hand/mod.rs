//! Hand pose recognition.
//!
//! `landmarks` holds the per-frame hand data, `pose` classifies a frame,
//! and `machine` debounces the classified poses into commands.

pub mod landmarks;
pub mod machine;
pub mod pose;

pub use landmarks::{HandLandmarks, LandmarkPoint, LandmarkSmoother, SmoothingConfig};
pub use machine::{GestureEvent, GestureMachine, MachineConfig, MachineState};
pub use pose::{classify, PoseConfig, PoseLabel};
