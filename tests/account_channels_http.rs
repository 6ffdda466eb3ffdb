mod common;

use axum::http::StatusCode;

use common::app::spawn_test_app;
use common::auth::{login, logged_in_browser, Browser};
use common::fixtures::{seed_channel, seed_site_admin, seed_user};
use common::http::assert_page_ok;
use streamchat_web::routes::account::channels::RELOAD_REASON;
use streamchat_web::services::channel_hub::ChannelEvent;

async fn new_channel(app: &common::app::TestApp, browser: &Browser, name: &str) -> String {
    let (status, _, body) = browser
        .post(
            &app.app,
            "/account/channels",
            &[("action", "new_channel"), ("name", name)],
        )
        .await;
    assert_page_ok(status, &body);
    body
}

async fn delete_channel(app: &common::app::TestApp, browser: &Browser, name: &str) -> String {
    let (status, _, body) = browser
        .post(
            &app.app,
            "/account/channels",
            &[("action", "delete_channel"), ("name", name)],
        )
        .await;
    assert_page_ok(status, &body);
    body
}

#[tokio::test]
async fn it_channels_page_requires_login() {
    let app = spawn_test_app().await;
    let browser = Browser::anonymous(&app.config);

    let (status, _, body) = browser.get(&app.app, "/account/channels").await;
    assert_page_ok(status, &body);
    assert!(body.contains("You must be logged in to manage channels."));

    let body = new_channel(&app, &browser, "lobby").await;
    assert!(body.contains("You must be logged in to manage channels."));
    assert!(app.state.store().find_channel("lobby").unwrap().is_none());
}

#[tokio::test]
async fn it_channels_page_lists_own_channels() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "quinn", "pw").await;
    seed_channel(app.state.store(), "quinnzone", "quinn");
    seed_channel(app.state.store(), "elsewhere", "somebody");

    let (status, _, body) = browser.get(&app.app, "/account/channels").await;
    assert_page_ok(status, &body);
    assert!(body.contains("quinnzone"));
    assert!(!body.contains("elsewhere"));
}

#[tokio::test]
async fn it_register_channel() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "rosa", "pw").await;

    let body = new_channel(&app, &browser, "Rosa_Live").await;
    assert!(!body.contains("id=\"new-channel-error\""), "{body}");
    assert!(body.contains("rosa_live"));

    let channel = app.state.store().lookup_channel("rosa_live").unwrap();
    assert_eq!(channel.owner, "rosa");
}

#[tokio::test]
async fn it_register_channel_rejections() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "sam", "pw").await;
    seed_user(app.state.store(), "tess", "pw", "");
    seed_channel(app.state.store(), "taken", "tess");

    let body = new_channel(&app, &browser, "API").await;
    assert!(body.contains("That channel name is reserved"));

    let body = new_channel(&app, &browser, "taken").await;
    assert!(body.contains("Channel name is already taken"));

    let body = new_channel(&app, &browser, "bad name!").await;
    assert!(body.contains("Invalid channel name."));

    new_channel(&app, &browser, "one").await;
    new_channel(&app, &browser, "two").await;
    let body = new_channel(&app, &browser, "three").await;
    assert!(body.contains("id=\"new-channel-error\""));
    assert!(body.contains("You are not allowed to register more than 2 channels."));
    assert!(app.state.store().find_channel("three").unwrap().is_none());
}

#[tokio::test]
async fn it_site_admin_ignores_channel_limit() {
    let app = spawn_test_app().await;
    seed_site_admin(app.state.store(), "root_user", "pw");
    let mut browser = Browser::anonymous(&app.config);
    login(&app.app, &mut browser, "root_user", "pw").await;

    for name in ["a1", "a2", "a3"] {
        let body = new_channel(&app, &browser, name).await;
        assert!(!body.contains("id=\"new-channel-error\""), "{body}");
    }
    assert_eq!(app.state.store().list_user_channels("root_user").unwrap().len(), 3);
}

#[tokio::test]
async fn it_delete_channel() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "uma", "pw").await;
    seed_channel(app.state.store(), "umaroom", "uma");

    let body = delete_channel(&app, &browser, "umaroom").await;
    assert!(!body.contains("id=\"delete-channel-error\""), "{body}");
    assert!(app.state.store().find_channel("umaroom").unwrap().is_none());

    let body = delete_channel(&app, &browser, "umaroom").await;
    assert!(body.contains("Channel does not exist"));
}

#[tokio::test]
async fn it_delete_channel_ignores_owner_index_keys() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "alice", "pw").await;
    seed_channel(app.state.store(), "lobby", "alice");

    let body = delete_channel(&app, &browser, "owner:alice:lobby").await;
    assert!(body.contains("id=\"delete-channel-error\""), "{body}");
    assert!(body.contains("Channel does not exist"));
    assert!(!body.contains("Database error"));

    let store = app.state.store();
    assert!(store.find_channel("lobby").unwrap().is_some());
    let owned = store.list_user_channels("alice").unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].name, "lobby");
}

#[tokio::test]
async fn it_delete_channel_requires_ownership_or_admin() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "vic", "pw").await;
    seed_user(app.state.store(), "walt", "pw", "");
    seed_channel(app.state.store(), "waltroom", "walt");

    let body = delete_channel(&app, &browser, "waltroom").await;
    assert!(body.contains("You do not have permission to delete this channel"));
    assert!(app.state.store().find_channel("waltroom").unwrap().is_some());

    seed_site_admin(app.state.store(), "boss", "pw");
    let mut admin = Browser::anonymous(&app.config);
    login(&app.app, &mut admin, "boss", "pw").await;
    let body = delete_channel(&app, &admin, "waltroom").await;
    assert!(!body.contains("id=\"delete-channel-error\""), "{body}");
    assert!(app.state.store().find_channel("waltroom").unwrap().is_none());
}

#[tokio::test]
async fn it_registration_changes_kick_live_viewers() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "xena", "pw").await;
    let hub = app.state.hub();

    let mut viewer = hub.join("xenalive", "anonymous", false);
    new_channel(&app, &browser, "xenalive").await;
    assert_eq!(
        viewer.events.recv().await,
        Some(ChannelEvent::Kicked {
            reason: RELOAD_REASON.to_string()
        })
    );
    assert!(!hub.is_loaded("xenalive"));

    let mut viewer = hub.join("xenalive", "anonymous", true);
    delete_channel(&app, &browser, "xenalive").await;
    assert!(matches!(viewer.events.recv().await, Some(ChannelEvent::Kicked { .. })));
    assert!(!hub.is_loaded("xenalive"));
}

#[tokio::test]
async fn it_channels_rejects_unknown_action() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "yara", "pw").await;

    let (status, _, _) = browser
        .post(&app.app, "/account/channels", &[("action", "rename"), ("name", "x")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
