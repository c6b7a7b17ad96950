//! Stream combinators used by streaming sessions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
