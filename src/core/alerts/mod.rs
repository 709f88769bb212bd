// Alert system module: arbitrates dashboard notifications.
//
// Architecture:
// - model.rs: Rule records and policy enums
// - triggers.rs: Evaluator trait and the built-in evaluators
// - registry.rs: Evaluator lookup and per-rule binding
// - catalog.rs: Validated rule catalog, JSON store, default rules
// - instance.rs: Active message instances and text composition
// - store.rs: Active instances, cooldowns and suppressions
// - style.rs: Priority-tiered and flag colors
// - selector.rs: Channel selection and the output snapshot
// - cancel.rs: Single/double press cancel protocol
// - engine.rs: Tick loop, cancel handling and session reset

pub mod cancel;
pub mod catalog;
pub mod engine;
pub mod instance;
pub mod model;
pub mod registry;
pub mod selector;
pub mod store;
pub mod style;
pub mod triggers;
