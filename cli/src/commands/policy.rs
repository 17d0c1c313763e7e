use xcrit_core::policy::{policy_document, weight_table};
use xcrit_runtime::RuntimeConfig;

use crate::util::print_json;

pub fn run(config: &RuntimeConfig, weights: bool) -> i32 {
    if weights {
        return print_json(&weight_table());
    }
    println!("{}", policy_document(&config.omega));
    0
}
