use super::*;
use crate::config::{MISC_PARAMETERS, SECTION};
use crate::host::Host;
use crate::test_support::{FakeHost, FakeServer, Message, mount_release};
use luals_lsp::downloader::packages::{LUA_LS_NAME, packages, repository};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ctx_with(host: Arc<FakeHost>, api: &str, custom_path: Option<PathBuf>) -> Ctx {
    let installer = ServerInstaller::new(
        LUA_LS_NAME,
        host.storage_dir(),
        packages(),
        repository("latest"),
        custom_path,
    )
    .unwrap()
    .with_api_base(api)
    .with_platform("linux-x64");
    Ctx::with_installer(
        host,
        Arc::new(Subscriptions::new()),
        Arc::new(FakeServer::default()),
        installer,
    )
    .unwrap()
}

fn install_existing(storage: &Path, version: &str) -> PathBuf {
    let bin = storage.join(LUA_LS_NAME).join("bin").join("lua-language-server");
    std::fs::create_dir_all(bin.parent().unwrap()).unwrap();
    std::fs::write(&bin, "").unwrap();
    std::fs::write(storage.join(LUA_LS_NAME).join(".version"), version).unwrap();
    bin
}

#[tokio::test]
async fn test_ensure_installed_across_policies() {
    #[derive(Clone, Copy, Debug)]
    enum Availability {
        Installed,
        Downloadable,
        DownloadFails,
    }

    let cases = [
        (json!(true), true),
        (json!(true), false),
        (json!(false), true),
        (json!("neverDownload"), true),
    ];

    for (prompt, accept) in cases {
        for availability in [
            Availability::Installed,
            Availability::Downloadable,
            Availability::DownloadFails,
        ] {
            let server = MockServer::start().await;
            let status = match availability {
                Availability::DownloadFails => 404,
                _ => 200,
            };
            mount_release(&server, "3.7.4", status).await;

            let dir = tempfile::tempdir().unwrap();
            let host = Arc::new(FakeHost::new().with_storage(dir.path()));
            host.set(SECTION, json!({ "prompt": prompt.clone() }));
            host.answer_confirm(accept);
            if let Availability::Installed = availability {
                install_existing(dir.path(), "3.7.4");
            }
            let ctx = ctx_with(host.clone(), &server.uri(), None);

            let policy = ctx.config.prompt().await;
            let download_allowed = policy.allow_download() && (!policy.prompt_always() || accept);
            let expected = match availability {
                Availability::Installed => true,
                Availability::Downloadable => download_allowed,
                Availability::DownloadFails => false,
            };

            assert_eq!(
                ctx.ensure_installed().await,
                expected,
                "prompt={} accept={} availability={:?}",
                prompt,
                accept,
                availability
            );
        }
    }
}

#[tokio::test]
async fn test_ensure_installed_downloads_latest() {
    let server = MockServer::start().await;
    mount_release(&server, "3.7.4", 200).await;

    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.set(SECTION, json!({ "prompt": false, "version": "latest" }));
    let ctx = ctx_with(host.clone(), &server.uri(), None);

    assert!(ctx.installer().installed_version().await.is_none());
    assert!(ctx.ensure_installed().await);
    assert_eq!(host.confirms(), 0);
    assert_eq!(
        ctx.installer().installed_version().await.as_deref(),
        Some("3.7.4")
    );
    assert!(ctx.resolve_bin().await.is_some());
}

#[tokio::test]
async fn test_failed_download_is_reported() {
    let server = MockServer::start().await;
    mount_release(&server, "3.7.4", 503).await;

    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.set(SECTION, json!({ "prompt": false }));
    let ctx = ctx_with(host.clone(), &server.uri(), None);

    assert!(!ctx.ensure_installed().await);
    let messages = host.messages();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        Message::Error(text) => assert!(!text.contains('\n')),
        other => panic!("unexpected message {:?}", other),
    }
}

#[tokio::test]
async fn test_auto_update_check_can_be_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    install_existing(dir.path(), "3.7.3");
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.set(SECTION, json!({ "checkOnStartup": false }));
    let ctx = ctx_with(host.clone(), &server.uri(), None);

    let report = tokio::time::timeout(Duration::from_secs(1), ctx.ensure_updated(true))
        .await
        .unwrap();
    assert!(report.is_none());
}

#[tokio::test]
async fn test_manual_update_ignores_check_on_startup() {
    let server = MockServer::start().await;
    mount_release(&server, "3.7.4", 200).await;

    let dir = tempfile::tempdir().unwrap();
    install_existing(dir.path(), "3.7.3");
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.set(SECTION, json!({ "checkOnStartup": false, "prompt": false }));
    let ctx = ctx_with(host.clone(), &server.uri(), None);

    let report = ctx.ensure_updated(false).await.unwrap();
    assert!(matches!(
        report,
        UpdateReport::Updated { ref from, ref to } if from == "3.7.3" && to == "3.7.4"
    ));
    // Manual checks always ask.
    assert_eq!(host.confirms(), 1);
    assert_eq!(ctx.get_current_version().await.as_deref(), Some("3.7.4"));
}

#[tokio::test]
async fn test_manual_update_downloads_despite_never_download() {
    let server = MockServer::start().await;
    mount_release(&server, "3.7.4", 200).await;

    let dir = tempfile::tempdir().unwrap();
    install_existing(dir.path(), "3.7.3");
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.set(SECTION, json!({ "prompt": "neverDownload" }));
    let ctx = ctx_with(host.clone(), &server.uri(), None);

    assert!(matches!(
        ctx.ensure_updated(true).await,
        Some(UpdateReport::Skipped { .. })
    ));
    assert!(matches!(
        ctx.ensure_updated(false).await,
        Some(UpdateReport::Updated { .. })
    ));
    assert_eq!(ctx.get_current_version().await.as_deref(), Some("3.7.4"));
}

#[tokio::test]
async fn test_update_restarts_running_session() {
    let api = MockServer::start().await;
    mount_release(&api, "3.7.4", 200).await;

    let dir = tempfile::tempdir().unwrap();
    install_existing(dir.path(), "3.7.3");
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.set(SECTION, json!({ "prompt": false }));

    let server = Arc::new(FakeServer::default());
    let installer = ServerInstaller::new(
        LUA_LS_NAME,
        host.storage_dir(),
        packages(),
        repository("latest"),
        None,
    )
    .unwrap()
    .with_api_base(api.uri())
    .with_platform("linux-x64");
    let ctx = Ctx::with_installer(
        host.clone(),
        Arc::new(Subscriptions::new()),
        server.clone(),
        installer,
    )
    .unwrap();

    assert!(ctx.start_server().await.unwrap());
    assert_eq!(server.launches(), 1);

    let report = ctx.ensure_updated(true).await.unwrap();
    assert!(matches!(report, UpdateReport::Updated { ref to, .. } if to == "3.7.4"));
    assert_eq!(server.launches(), 2);

    let client = ctx.client().await.unwrap();
    assert!(client.is_server_alive());
    assert!(client.is_initialized());
    assert_eq!(ctx.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_update_prompt_declined() {
    let server = MockServer::start().await;
    mount_release(&server, "3.7.4", 200).await;

    let dir = tempfile::tempdir().unwrap();
    install_existing(dir.path(), "3.7.3");
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.answer_confirm(false);
    let ctx = ctx_with(host.clone(), &server.uri(), None);

    assert!(matches!(
        ctx.ensure_updated(true).await,
        Some(UpdateReport::Declined)
    ));
    assert_eq!(host.confirms(), 1);
    assert_eq!(ctx.get_current_version().await.as_deref(), Some("3.7.3"));
}

#[tokio::test]
async fn test_resolve_bin_requires_existing_binary() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.set(
        SECTION,
        json!({ "locale": "zh-cn", "logPath": "/tmp/luals", "prompt": false }),
    );
    host.set(MISC_PARAMETERS, json!(["--develop=true"]));

    let managed = ctx_with(host.clone(), "http://127.0.0.1:9", None);
    assert!(managed.resolve_bin().await.is_none());

    let missing = dir.path().join("elsewhere").join("bin").join("lua-language-server");
    let custom = ctx_with(host.clone(), "http://127.0.0.1:9", Some(missing));
    assert!(custom.resolve_bin().await.is_none());

    // Appears after an install, disappears again when removed.
    let bin = install_existing(dir.path(), "3.7.4");
    assert!(managed.resolve_bin().await.is_some());
    std::fs::remove_file(&bin).unwrap();
    assert!(managed.resolve_bin().await.is_none());
}

#[tokio::test]
async fn test_resolve_bin_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let bin = install_existing(dir.path(), "3.7.4");
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    host.set(SECTION, json!({ "locale": "zh-cn", "logPath": "/tmp/luals" }));
    host.set(MISC_PARAMETERS, json!(["--develop=true"]));
    let ctx = ctx_with(host.clone(), "http://127.0.0.1:9", None);

    let (command, args) = ctx.resolve_bin().await.unwrap();
    assert_eq!(command, bin);
    let main = dir
        .path()
        .join(LUA_LS_NAME)
        .join("bin")
        .join("main.lua")
        .to_string_lossy()
        .into_owned();
    assert_eq!(
        args,
        vec![
            "-E".to_string(),
            main,
            "--locale=zh-cn".to_string(),
            "--develop=true".to_string(),
            "--logpath=/tmp/luals".to_string(),
        ]
    );

    host.set(SECTION, json!({}));
    host.set(MISC_PARAMETERS, Value::Null);
    let (_, args) = ctx.resolve_bin().await.unwrap();
    assert_eq!(args.len(), 3);
    assert_eq!(args[2], "--locale=en-us");
}

#[tokio::test]
async fn test_start_server_without_binary() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));
    let ctx = ctx_with(host, "http://127.0.0.1:9", None);

    assert!(!ctx.start_server().await.unwrap());
    assert_eq!(ctx.state(), SessionState::Uninitialized);
    assert!(ctx.subscriptions().is_empty());
    assert!(ctx.client().await.is_none());
}

#[tokio::test]
async fn test_server_config_edits_reach_host() {
    let dir = tempfile::tempdir().unwrap();
    let bin = install_existing(dir.path(), "3.7.4");
    let host = Arc::new(FakeHost::new().with_storage(dir.path()));

    let server = Arc::new(FakeServer::default());
    server.send_after_init(
        "$/command",
        json!({
            "command": "lua.config",
            "data": [
                { "key": "Lua.diagnostics.globals", "action": "add", "value": "vim", "global": true }
            ]
        }),
    );
    let installer = ServerInstaller::new(
        LUA_LS_NAME,
        host.storage_dir(),
        packages(),
        repository("latest"),
        Some(bin),
    )
    .unwrap();
    let ctx = Ctx::with_installer(
        host.clone(),
        Arc::new(Subscriptions::new()),
        server.clone(),
        installer,
    )
    .unwrap();

    assert!(ctx.start_server().await.unwrap());
    assert_eq!(ctx.state(), SessionState::Ready);

    tokio::time::timeout(Duration::from_secs(5), async {
        while host.global("Lua.diagnostics.globals").is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(host.global("Lua.diagnostics.globals"), Some(json!(["vim"])));

    ctx.stop().await.unwrap();
    assert_eq!(ctx.state(), SessionState::Stopped);
}
