use control_plane::memory::MemoryStore;
use control_plane::repository::CatalogRepository;
use control_plane::{ControlPlane, ControlPlaneConfig};
use host_agent::settings::SettingsStore;
use host_agent::{HostAgent, HostAgentConfig};
use std::path::Path;
use tokio::net::TcpListener;
use tokio::sync::watch;
use weaver_types::{
    AccountId, ConfigurationItem, ContentType, Game, GameId, GameProfile, GameServer, GameSource,
    HostId, LocalResource, OsPaths, ResourceType, ServerId, TargetType, WorkStatus,
};

async fn start_control_plane() -> (ControlPlane, TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let public_url = format!("http://{}", listener.local_addr().unwrap());
    let config = ControlPlaneConfig {
        operator_key: "e2e".to_string(),
        public_url: public_url.clone(),
        ..ControlPlaneConfig::default()
    };
    (ControlPlane::build(&config).await.unwrap(), listener, public_url)
}

async fn seed_configurable_server(
    store: &MemoryStore,
    host_id: HostId,
    install_dir: &Path,
) -> ServerId {
    let mut default_profile = GameProfile::new(GameId::new(), "default");
    let game = Game {
        id: default_profile.game_id,
        name: "Configurable".to_string(),
        source: GameSource::Manual,
        default_profile_id: default_profile.id,
    };
    let mut settings = LocalResource::new(
        "settings",
        ResourceType::Config,
        OsPaths::same("cfg/server.json"),
    );
    settings.content_type = ContentType::Json;
    settings.items = vec![
        ConfigurationItem::new("maxPlayers", "24"),
        ConfigurationItem::new("name", "weaver e2e"),
    ];
    default_profile.resources.push(settings);
    let own = GameProfile::new(game.id, "own");

    let server = GameServer {
        id: ServerId::new(),
        owner: AccountId::new(),
        host_id,
        game_id: game.id,
        game_profile_id: own.id,
        parent_game_profile_id: None,
        name: "e2e-1".to_string(),
        install_dir: install_dir.to_path_buf(),
        ports: vec![],
        state: Default::default(),
        deleted: false,
    };
    let server_id = server.id;

    store.upsert_game(game).await.unwrap();
    store.upsert_profile(default_profile).await.unwrap();
    store.upsert_profile(own).await.unwrap();
    store.upsert_server(server).await.unwrap();
    server_id
}

#[tokio::test]
async fn agent_enrolls_and_runs_dispatched_work() {
    let scratch = tempfile::tempdir().unwrap();
    let (control_plane, listener, public_url) = start_control_plane().await;
    let state = control_plane.state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ticket = state
        .auth
        .request_registration(AccountId::new(), "e2e box")
        .await
        .unwrap();
    let settings_path = scratch.path().join("host.toml");
    std::fs::write(
        &settings_path,
        format!("[auth]\nregister_url = \"{}\"\n", ticket.url),
    )
    .unwrap();

    let store = control_plane.store();
    let server = tokio::spawn(control_plane.serve(listener, shutdown_rx));

    let agent = HostAgent::new(HostAgentConfig {
        settings_path: settings_path.clone(),
        backup_root: scratch.path().join("backups"),
        ..HostAgentConfig::default()
    })
    .await
    .unwrap();

    // First cycle confirms the link, fetches a token and finds no work
    let report = agent.dispatcher().run_cycle().await.unwrap();
    assert_eq!(report.received, 0);

    let stored = SettingsStore::load(&settings_path).await.unwrap().snapshot().await;
    assert_eq!(stored.general.server_url.as_deref(), Some(public_url.as_str()));
    assert!(stored.auth.register_url.is_none());
    let host_id: HostId = stored.auth.host_id.unwrap().parse().unwrap();
    assert!(stored.auth.host_key.is_some());

    let install_dir = scratch.path().join("server");
    let server_id = seed_configurable_server(&store, host_id, &install_dir).await;
    let work_id = state
        .actions
        .dispatch(server_id, TargetType::Configure, false)
        .await
        .unwrap();

    let report = agent.dispatcher().run_cycle().await.unwrap();
    assert_eq!((report.received, report.completed, report.failed), (1, 1, 0));

    let written = std::fs::read_to_string(install_dir.join("cfg/server.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(value["maxPlayers"], "24");
    assert_eq!(value["name"], "weaver e2e");

    let work = state.queue.get(work_id).await.unwrap().unwrap();
    assert_eq!(work.status, WorkStatus::Completed);

    drop(agent);
    shutdown_tx.send(true).unwrap();
    server.await.unwrap().unwrap();
}

