use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::csrf::Csrf;
use crate::extractors::FormBody;
use crate::response::AppError;
use crate::routes::client::redirect_https;
use crate::state::AppState;
use crate::store::operations::users::Profile;
use crate::validation::{is_http_url, truncate_chars, MAX_PROFILE_FIELD_CHARS};
use crate::views::{render_template, AccountProfilePage, PageContext};

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(rename = "_csrf")]
    pub csrf: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
}

fn profile_view(
    ctx: PageContext,
    profile: Profile,
    profile_error: Option<String>,
) -> Result<Response, AppError> {
    render_template(AccountProfilePage {
        ctx,
        profile_image: profile.image,
        profile_text: profile.text,
        profile_error,
    })
}

pub async fn profile_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    csrf: Csrf,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    if let Some(redirect) = redirect_https(state.config(), &headers, &uri) {
        return Ok(redirect);
    }

    let ctx = PageContext::new(user.as_ref(), &csrf, state.config());
    let Some(user) = user else {
        return profile_view(ctx, Profile::default(), None);
    };

    match state.store().get_profile(&user.name) {
        Ok(profile) => profile_view(ctx, profile, None),
        Err(e) => profile_view(ctx, Profile::default(), Some(e.public_message())),
    }
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    csrf: Csrf,
    FormBody(form): FormBody<ProfileForm>,
) -> Result<Response, AppError> {
    csrf.verify(form.csrf.as_deref())?;

    let ctx = PageContext::new(user.as_ref(), &csrf, state.config());
    let Some(user) = user else {
        return profile_view(
            ctx,
            Profile::default(),
            Some("You must be logged in to edit your profile".into()),
        );
    };

    let image = form.image.as_deref().unwrap_or("").trim();
    let text = form.text.as_deref().unwrap_or("");

    if !image.is_empty() && !is_http_url(image) {
        return profile_view(
            ctx,
            Profile::default(),
            Some("Profile image must be an http or https URL".into()),
        );
    }

    let profile = Profile {
        image: truncate_chars(image, MAX_PROFILE_FIELD_CHARS).to_string(),
        text: truncate_chars(text, MAX_PROFILE_FIELD_CHARS).to_string(),
    };

    match state.store().set_profile(&user.name, &profile) {
        Ok(()) => profile_view(ctx, profile, None),
        Err(e) => profile_view(ctx, Profile::default(), Some(e.public_message())),
    }
}
