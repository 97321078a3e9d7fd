use std::collections::HashMap;

use serde::Deserialize;

use crate::jit::DEFAULT_MAX_CALL_DEPTH;
use crate::parser::Precedence;


#[derive(Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_call_depth: usize,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Print "ready> " to the diagnostic stream before each statement.
    pub prompt: bool,
    /// Print the still-open module when input ends.
    pub print_module_at_exit: bool,
    /// Operator precedences overriding or extending the built-in table.
    pub precedence: HashMap<char, i32>,
    pub engine: EngineConfig,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig { max_call_depth: DEFAULT_MAX_CALL_DEPTH }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            prompt: false,
            print_module_at_exit: true,
            precedence: HashMap::new(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn precedence_table(&self) -> Precedence {
        let mut table = Precedence::default();
        for (&op, &p) in &self.precedence {
            table.set(op, p);
        }
        table
    }
}
