use agentroom::config::AgentRoomConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    agentroom::init_logger();

    let config = AgentRoomConfig::from_env()?;
    log::info!(
        "starting research room with model {} (max_round {})",
        config.model,
        config.max_round
    );
    agentroom::server::serve(config).await
}
