//! Core value types shared by the producer and the sessions.
//!
//! - [`RawFrame`] is what a capture source hands to the encoder
//! - [`Frame`] is the immutable, encoded unit published to the frame buffer
//! - [`UpdateRate`] is a client's requested delivery cap

mod frame;
mod update_rate;

pub use frame::{Frame, RawFrame};
pub use update_rate::UpdateRate;
