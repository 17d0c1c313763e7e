use xcrit_core::AnalysisResult;
use xcrit_runtime::prompts::hybrid_prompt;

use crate::TitleArgs;
use crate::util::{EXIT_FAILURE, EXIT_USAGE, build_request, read_json_from_file, report_error};

pub fn run(target: TitleArgs, local_file: &str) -> i32 {
    let local = match read_json_from_file(local_file)
        .and_then(|value| AnalysisResult::decode(value).map_err(|e| e.to_string()))
    {
        Ok(local) => local,
        Err(message) => {
            report_error(
                "validation_failed",
                &message,
                Some("Pass the JSON printed by `xcrit analyze`."),
            );
            return EXIT_USAGE;
        }
    };

    let request = build_request(&target.title, target.medium, target.lang, None);
    match hybrid_prompt(&request, &local) {
        Ok(prompt) => {
            println!("{prompt}");
            0
        }
        Err(e) => {
            report_error("prompt_error", &e.to_string(), None);
            EXIT_FAILURE
        }
    }
}
