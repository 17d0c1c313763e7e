use xcrit_core::{AbbfInputs, reconcile};
use xcrit_runtime::RuntimeConfig;

use crate::util::{EXIT_FAILURE, EXIT_USAGE, print_json, read_json_from_file, report_error};

pub fn run(config: &RuntimeConfig, request_file: &str) -> i32 {
    let inputs: AbbfInputs = match read_json_from_file(request_file)
        .and_then(|value| serde_json::from_value(value).map_err(|e| format!("Invalid inputs: {e}")))
    {
        Ok(inputs) => inputs,
        Err(message) => {
            report_error("validation_failed", &message, None);
            return EXIT_USAGE;
        }
    };

    match reconcile(&inputs, &config.omega) {
        Ok(report) => print_json(&report),
        Err(e) => {
            report_error("engine_error", &e.to_string(), None);
            EXIT_FAILURE
        }
    }
}
