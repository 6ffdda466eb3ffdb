use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::{CurrentUser, SessionUser};
use crate::csrf::Csrf;
use crate::extractors::{require, ClientIp, FormBody};
use crate::logging::EVENT_LOG;
use crate::response::AppError;
use crate::routes::client::redirect_https;
use crate::services::channel_hub::ChannelHub;
use crate::state::AppState;
use crate::store::operations::channels::Channel;
use crate::store::StoreError;
use crate::views::{render_template, AccountChannelsPage, ChannelRow, PageContext};

/// Reason shown to viewers kicked when a channel's registration changes.
pub const RELOAD_REASON: &str = "Channel reloading";

#[derive(Debug, Deserialize)]
pub struct AccountChannelsForm {
    #[serde(rename = "_csrf")]
    pub csrf: Option<String>,
    pub action: Option<String>,
    pub name: Option<String>,
}

#[derive(Default)]
struct ChannelsView {
    channels: Vec<ChannelRow>,
    new_channel_error: Option<String>,
    delete_channel_error: Option<String>,
}

impl ChannelsView {
    fn listing(channels: Vec<Channel>) -> Self {
        Self {
            channels: rows(channels),
            ..Self::default()
        }
    }

    fn render(self, ctx: PageContext) -> Result<Response, AppError> {
        render_template(AccountChannelsPage {
            ctx,
            channels: self.channels,
            new_channel_error: self.new_channel_error,
            delete_channel_error: self.delete_channel_error,
        })
    }
}

fn rows(channels: Vec<Channel>) -> Vec<ChannelRow> {
    channels
        .into_iter()
        .map(|c| ChannelRow { name: c.name })
        .collect()
}

pub async fn channels_page(
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
        return ChannelsView::default().render(ctx);
    };

    match state.store().list_user_channels(&user.name) {
        Ok(channels) => ChannelsView::listing(channels).render(ctx),
        Err(e) => {
            tracing::warn!(user = %user.name, error = %e, "Failed to list channels");
            ChannelsView::default().render(ctx)
        }
    }
}

pub async fn account_channels(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ClientIp(ip): ClientIp,
    csrf: Csrf,
    FormBody(form): FormBody<AccountChannelsForm>,
) -> Result<Response, AppError> {
    csrf.verify(form.csrf.as_deref())?;

    let ip = ip.to_string();
    match form.action.as_deref() {
        Some("new_channel") => new_channel(&state, user.as_ref(), &csrf, &ip, &form),
        Some("delete_channel") => delete_channel(&state, user.as_ref(), &csrf, &ip, &form),
        _ => Err(AppError::bad_request("UNKNOWN_ACTION", "unknown channel action")),
    }
}

fn new_channel(
    state: &AppState,
    user: Option<&SessionUser>,
    csrf: &Csrf,
    ip: &str,
    form: &AccountChannelsForm,
) -> Result<Response, AppError> {
    let name = require(&form.name, "name")?;
    let config = state.config();
    let ctx = PageContext::new(user, csrf, config);

    let Some(user) = user else {
        return ChannelsView::default().render(ctx);
    };

    let store = state.store();
    let channels = match store.list_user_channels(&user.name) {
        Ok(channels) => channels,
        Err(e) => {
            return ChannelsView {
                new_channel_error: Some(e.public_message()),
                ..ChannelsView::default()
            }
            .render(ctx)
        }
    };

    let mut view = ChannelsView::listing(channels);

    if config.reserved_names.channels.is_match(name) {
        view.new_channel_error = Some("That channel name is reserved".into());
        return view.render(ctx);
    }

    if view.channels.len() >= config.max_channels_per_user && !user.is_site_admin() {
        view.new_channel_error = Some(format!(
            "You are not allowed to register more than {} channels.",
            config.max_channels_per_user
        ));
        return view.render(ctx);
    }

    match store.register_channel(name, &user.name) {
        Ok(channel) => {
            tracing::info!(
                target: EVENT_LOG,
                "[channel] {}@{ip} registered channel {name}",
                user.name
            );
            if let Some(kicked) = state.hub().reload(&channel.name, RELOAD_REASON) {
                tracing::debug!(channel = %channel.name, kicked, "Reloaded live channel");
            }
            view.channels.push(ChannelRow { name: channel.name });
        }
        Err(e) => view.new_channel_error = Some(e.public_message()),
    }

    view.render(ctx)
}

fn delete_channel(
    state: &AppState,
    user: Option<&SessionUser>,
    csrf: &Csrf,
    ip: &str,
    form: &AccountChannelsForm,
) -> Result<Response, AppError> {
    let name = require(&form.name, "name")?;
    let ctx = PageContext::new(user, csrf, state.config());

    let Some(user) = user else {
        return ChannelsView::default().render(ctx);
    };

    let store = state.store();
    let listing = || store.list_user_channels(&user.name).unwrap_or_default();

    let channel = match store.lookup_channel(name) {
        Ok(channel) => channel,
        Err(e) => {
            return ChannelsView {
                delete_channel_error: Some(e.public_message()),
                ..ChannelsView::default()
            }
            .render(ctx)
        }
    };

    if !channel.owner.eq_ignore_ascii_case(&user.name) && !user.is_site_admin() {
        let mut view = ChannelsView::listing(listing());
        view.delete_channel_error =
            Some("You do not have permission to delete this channel".into());
        return view.render(ctx);
    }

    let dropped = store.drop_channel(name);
    if dropped.is_ok() {
        tracing::info!(
            target: EVENT_LOG,
            "[channel] {}@{ip} deleted channel {name}",
            user.name
        );
    }

    let mut view = ChannelsView::listing(listing());
    view.delete_channel_error = settle_drop(state.hub(), &channel.name, dropped);
    view.render(ctx)
}

/// Kicks live viewers of a channel that was just unregistered. A failed
/// drop leaves the live channel alone and yields the error to show.
fn settle_drop(
    hub: &ChannelHub,
    channel: &str,
    dropped: Result<(), StoreError>,
) -> Option<String> {
    match dropped {
        Ok(()) => {
            if let Some(kicked) = hub.reload(channel, RELOAD_REASON) {
                tracing::debug!(channel, kicked, "Unregistered live channel");
            }
            None
        }
        Err(e) => Some(e.public_message()),
    }
}
