mod keep_rules;
mod loader;

pub use keep_rules::{glob_to_regex, KeepRule, KeepRuleConfig, KeepRuleError, KeepRules};
pub use loader::{Config, ReportConfig, DEFAULT_COUNTER_SET};
