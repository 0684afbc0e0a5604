use crate::agentroom::client_wrapper::TokenUsage;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use std::error::Error;
use std::time::Duration;
use tokio::sync::Mutex;

lazy_static::lazy_static! {
    /// One pooled HTTP client shared by every provider wrapper in the process.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
}

/// Borrow the process wide HTTP client used for LLM traffic.
pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

/// Send a chat request, record its usage, and return the assistant's content.
pub async fn send_and_track(
    api: &openai_rust::Client,
    model: &str,
    formatted_msgs: Vec<chat::Message>,
    url_path: Option<String>,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    let chat_arguments = chat::ChatArguments::new(model, formatted_msgs);

    match api.create_chat(chat_arguments, url_path).await {
        Ok(response) => {
            let usage = TokenUsage {
                input_tokens: response.usage.prompt_tokens as usize,
                output_tokens: response.usage.completion_tokens as usize,
                total_tokens: response.usage.total_tokens as usize,
            };
            *usage_slot.lock().await = Some(usage);

            match response.choices.first() {
                Some(choice) => Ok(choice.message.content.clone()),
                None => Err("chat completion returned no choices".into()),
            }
        }
        Err(err) => {
            log::error!(
                "agentroom::clients::common::send_and_track(...): OpenAI API Error: {}",
                err
            );
            Err(err.to_string().into())
        }
    }
}
