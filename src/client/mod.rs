//! Client-side netcode: local prediction and snapshot reconciliation.
//!
//! Rendering, audio and UI live elsewhere; this module only decides where
//! the local tank is and when to send input.

pub mod predictor;
pub mod reconcile;
pub mod session;

pub use predictor::{ClientPredictor, ControlKey, PendingInput};
pub use reconcile::{Correction, Motion, Reconciliator, RemoteBullet, RemoteTank, Smoothed};
pub use session::ClientSession;
