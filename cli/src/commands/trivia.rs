use tokio_util::sync::CancellationToken;
use xcrit_runtime::trivia::fetch_trivia;
use xcrit_runtime::{GeminiProvider, RuntimeConfig};

use crate::TitleArgs;
use crate::util::{build_request, print_json, require_api_key};

pub async fn run(config: &RuntimeConfig, target: TitleArgs) -> i32 {
    if let Err(code) = require_api_key(config) {
        return code;
    }

    let provider = GeminiProvider::new(config.gemini.clone());
    let request = build_request(&target.title, target.medium, target.lang, None);
    // Failures come back as the placeholder record
    let trivia = fetch_trivia(&provider, &request, config.stage_timeout, &CancellationToken::new()).await;
    print_json(&trivia)
}
