pub mod alarm;
pub mod scheduler;
pub mod types;

pub use alarm::{
    compute_next_alarm, consume_zb12_modified, evaluate_triggers, how_long_until_next_alarm,
    is_clock_skewed, next_alarm, soonest_trigger, EVALUATORS,
};
pub use scheduler::AlarmSchedulerCore;
pub use types::*;
