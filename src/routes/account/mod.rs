pub mod channels;
pub mod edit;
pub mod profile;
pub mod recovery;

use axum::response::Redirect;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Routes under `/account`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(account_index))
        .route("/edit", get(edit::edit_page).post(edit::account_edit))
        .route(
            "/channels",
            get(channels::channels_page).post(channels::account_channels),
        )
        .route(
            "/profile",
            get(profile::profile_page).post(profile::update_profile),
        )
        .route(
            "/passwordreset",
            get(recovery::password_reset_page).post(recovery::password_reset),
        )
        .route("/passwordrecover/:hash", get(recovery::password_recover))
}

async fn account_index() -> Redirect {
    Redirect::to("/login")
}
