//! Built-in conditions, actions and their context parsers.
//!
//! A function's registered name is also its parser key: a trigger whose
//! `condition.name` is `counter_threshold` gets the `counter_threshold`
//! parser run over its context during contextualization.

pub mod actions;
pub mod conditions;

pub use actions::{EmitEventAction, PassAction};
pub use conditions::{CounterThreshold, DataMatch, TrueCondition};

use crate::registry::Registries;

/// Register every built-in function and parser into `registries`.
pub fn register_builtins(registries: &mut Registries) {
    registries
        .register_condition(conditions::TRUE, TrueCondition)
        .register_condition(conditions::COUNTER_THRESHOLD, CounterThreshold)
        .register_parser(
            conditions::COUNTER_THRESHOLD,
            conditions::parse_counter_threshold,
        )
        .register_condition(conditions::DATA_MATCH, DataMatch)
        .register_parser(conditions::DATA_MATCH, conditions::parse_data_match)
        .register_action(actions::PASS, PassAction)
        .register_action(actions::EMIT_EVENT, EmitEventAction)
        .register_parser(actions::EMIT_EVENT, actions::parse_emit_event);
}
