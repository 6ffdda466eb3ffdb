mod common;

use common::app::spawn_test_app;
use common::auth::{logged_in_browser, Browser};
use common::http::assert_page_ok;
use streamchat_web::store::operations::users::Profile;

#[tokio::test]
async fn it_profile_requires_login() {
    let app = spawn_test_app().await;
    let browser = Browser::anonymous(&app.config);

    let (status, _, body) = browser.get(&app.app, "/account/profile").await;
    assert_page_ok(status, &body);
    assert!(body.contains("You must be logged in to edit your profile."));

    let (status, _, body) = browser
        .post(&app.app, "/account/profile", &[("image", ""), ("text", "hi")])
        .await;
    assert_page_ok(status, &body);
    assert!(body.contains("id=\"profile-error\""));
}

#[tokio::test]
async fn it_update_and_show_profile() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "zoe", "pw").await;

    let (status, _, body) = browser
        .post(
            &app.app,
            "/account/profile",
            &[("image", ""), ("text", "Streaming every evening")],
        )
        .await;
    assert_page_ok(status, &body);
    assert!(!body.contains("id=\"profile-error\""), "{body}");
    assert!(body.contains("Streaming every evening"));

    let (_, _, body) = browser.get(&app.app, "/account/profile").await;
    assert!(body.contains("Streaming every evening"));
    assert_eq!(
        app.state.store().get_profile("zoe").unwrap(),
        Profile {
            image: String::new(),
            text: "Streaming every evening".to_string(),
        }
    );
}

#[tokio::test]
async fn it_profile_image_must_be_http_url() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "amy", "pw").await;

    let (_, _, body) = browser
        .post(
            &app.app,
            "/account/profile",
            &[("image", "javascript:alert(1)"), ("text", "x")],
        )
        .await;
    assert!(body.contains("Profile image must be an http or https URL"));
    assert_eq!(app.state.store().get_profile("amy").unwrap(), Profile::default());

    let (_, _, body) = browser
        .post(
            &app.app,
            "/account/profile",
            &[("image", "https://img.example.com/a.png"), ("text", "x")],
        )
        .await;
    assert!(!body.contains("id=\"profile-error\""), "{body}");
    assert_eq!(
        app.state.store().get_profile("amy").unwrap().image,
        "https://img.example.com/a.png"
    );
}

#[tokio::test]
async fn it_profile_fields_are_truncated() {
    let app = spawn_test_app().await;
    let browser = logged_in_browser(&app, "ben", "pw").await;
    let long_text = "y".repeat(400);

    browser
        .post(
            &app.app,
            "/account/profile",
            &[("image", ""), ("text", long_text.as_str())],
        )
        .await;
    let stored = app.state.store().get_profile("ben").unwrap();
    assert_eq!(stored.text.chars().count(), 255);
}
