mod actor;
mod clock;
mod error;

pub use actor::{spawn, ActorMessage, AlarmActor, AlarmHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, RuntimeError};
