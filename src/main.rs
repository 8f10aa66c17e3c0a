use usersvc::{app, config::AppConfig, state::AppState, users::services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    app::init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        project = %config.project_name,
        environment = ?config.environment,
        token_ttl_minutes = config.jwt.ttl_minutes,
        open_registration = config.users.open_registration,
        "configuration loaded"
    );

    let state = AppState::init(config).await?;

    if let Some(su) = &state.config.users.first_superuser {
        services::ensure_first_superuser(state.repo.as_ref(), su).await?;
    }

    let (host, port) = (state.config.host.clone(), state.config.port);
    app::serve(app::build_app(state), &host, port).await
}
