pub mod clock;
pub mod token;
pub mod types;

pub use clock::{Clock, ManualClock, SkewedClock, SystemClock, duration_millis};
pub use token::{SequentialTokenSource, TokenSource, UuidTokenSource};
pub use types::{ResourceName, Token};
