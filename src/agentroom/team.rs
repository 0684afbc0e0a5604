//! The default research room: one human and three agents.
//!
//! | seat               | kind  | role                                                      |
//! |--------------------|-------|-----------------------------------------------------------|
//! | `director`         | agent | breaks the request down, decides when the work is done    |
//! | `user_proxy`       | human | the person at the browser, asked every time it is picked  |
//! | `researcher`       | agent | runs `google_search` and `web_scraping`                   |
//! | `research_manager` | agent | reviews findings and asks for more research               |
//!
//! The conversation ends when a message contains `TERMINATE`, after `max_round` messages, or
//! when the human types `exit`. The next speaker is picked by the chat model.

use std::sync::Arc;

use crate::agentroom::agent::Agent;
use crate::agentroom::client_wrapper::ClientWrapper;
use crate::agentroom::clients::openai::OpenAIClient;
use crate::agentroom::config::AgentRoomConfig;
use crate::agentroom::event::LoggingEventHandler;
use crate::agentroom::group_chat::{
    ChatError, GroupChatManager, HumanInputMode, HumanProxy, LlmSpeakerSelector, Participant,
    TerminationCondition,
};
use crate::agentroom::tool_protocols::WebResearchProtocol;
use crate::agentroom::tools::{LlmSummarizer, WebScraper, WebSearch};

pub const CHAT_MANAGER: &str = "chat_manager";
pub const DIRECTOR: &str = "director";
pub const USER_PROXY: &str = "user_proxy";
pub const RESEARCHER: &str = "researcher";
pub const RESEARCH_MANAGER: &str = "research_manager";

pub const TERMINATION_SENTINEL: &str = "TERMINATE";

const DIRECTOR_INSTRUCTIONS: &str = "You lead a small research team. Break the user's request \
into concrete research tasks, hand them to the researcher, and check the result with the \
research manager. Ask the user_proxy when the request is ambiguous. When the user's request \
is fully answered, reply with the final answer followed by TERMINATE.";

const RESEARCHER_INSTRUCTIONS: &str = "You are a world class researcher who produces \
fact-based research. Use google_search to find sources and web_scraping to read them. Never \
make up facts or urls; only use urls found in search results. End every answer with the list \
of urls you used.";

const RESEARCH_MANAGER_INSTRUCTIONS: &str = "You are a research manager. Review the \
researcher's findings for completeness and accuracy, point out gaps and ask for more research \
when needed. Be kind.";

fn openai_client(config: &AgentRoomConfig, model: &str) -> Arc<dyn ClientWrapper> {
    match &config.openai_base_url {
        Some(base_url) => Arc::new(OpenAIClient::new_with_base_url(
            &config.openai_api_key,
            model,
            base_url,
        )),
        None => Arc::new(OpenAIClient::new_with_model_string(
            &config.openai_api_key,
            model,
        )),
    }
}

/// Build a fresh room from `config`. Every call returns independent agents and transcript.
pub fn build_research_room(config: &AgentRoomConfig) -> Result<GroupChatManager, ChatError> {
    let chat_llm = openai_client(config, &config.model);
    let summary_llm = openai_client(config, &config.summary_model);

    let search = WebSearch::new(config.serper_api_key.clone())
        .with_endpoint(config.search_endpoint.clone())
        .with_timeout(config.tool_timeout);
    let scraper = WebScraper::new(
        config.browserless_api_key.clone(),
        Arc::new(LlmSummarizer::new(summary_llm)),
    )
    .with_endpoint(config.scrape_endpoint.clone())
    .with_timeout(config.tool_timeout)
    .with_chunking(
        config.summary_threshold,
        config.chunk_size,
        config.chunk_overlap,
    );
    let research_tools =
        Arc::new(WebResearchProtocol::new(Arc::new(search), Arc::new(scraper))).into_registry();

    let director = Agent::new(DIRECTOR, DIRECTOR, Arc::clone(&chat_llm))
        .with_expertise("Coordinates the team and decides when the request is answered.")
        .with_instructions(DIRECTOR_INSTRUCTIONS);
    let researcher = Agent::new(RESEARCHER, RESEARCHER, Arc::clone(&chat_llm))
        .with_expertise("Searches the web and reads pages to gather facts.")
        .with_instructions(RESEARCHER_INSTRUCTIONS)
        .with_tools(research_tools);
    let research_manager = Agent::new(RESEARCH_MANAGER, RESEARCH_MANAGER, Arc::clone(&chat_llm))
        .with_expertise("Reviews research quality and asks for follow-ups.")
        .with_instructions(RESEARCH_MANAGER_INSTRUCTIONS);
    let user_proxy = HumanProxy::new(USER_PROXY).with_mode(HumanInputMode::Always);

    let mut room = GroupChatManager::new(CHAT_MANAGER)
        .with_max_round(config.max_round)
        .with_termination(TerminationCondition::contains(TERMINATION_SENTINEL))
        .with_selector(Arc::new(LlmSpeakerSelector::new(chat_llm)))
        .with_event_handler(Arc::new(LoggingEventHandler));

    room.add_participant(Participant::agent(director))?;
    room.add_participant(Participant::human(user_proxy))?;
    room.add_participant(Participant::agent(researcher))?;
    room.add_participant(Participant::agent(research_manager))?;

    Ok(room)
}
