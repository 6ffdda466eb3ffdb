use askama::Template;
use axum::response::{Html, IntoResponse, Response};

use crate::auth::SessionUser;
use crate::config::Config;
use crate::csrf::Csrf;
use crate::response::AppError;

/// Values every page layout needs: who is logged in, the CSRF token for
/// forms and the public site address.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub logged_in: bool,
    pub login_name: String,
    pub superadmin: bool,
    pub csrf_token: String,
    pub domain: String,
}

impl PageContext {
    pub fn new(user: Option<&SessionUser>, csrf: &Csrf, config: &Config) -> Self {
        Self {
            logged_in: user.is_some(),
            login_name: user.map(|u| u.name.clone()).unwrap_or_default(),
            superadmin: user.is_some_and(SessionUser::is_site_admin),
            csrf_token: csrf.token(),
            domain: config.http.domain.clone(),
        }
    }

    pub fn logged_in_as(mut self, name: &str, superadmin: bool) -> Self {
        self.logged_in = true;
        self.login_name = name.to_string();
        self.superadmin = superadmin;
        self
    }

    pub fn logged_out(mut self) -> Self {
        self.logged_in = false;
        self.login_name.clear();
        self.superadmin = false;
        self
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Response, AppError> {
    Ok(Html(template.render()?).into_response())
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub ctx: PageContext,
    pub login_error: Option<String>,
    pub was_already_logged_in: bool,
    pub redirect: String,
}

#[derive(Template)]
#[template(path = "logout.html")]
pub struct LogoutPage {
    pub ctx: PageContext,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterPage {
    pub ctx: PageContext,
    pub registered: bool,
    pub register_error: Option<String>,
    pub register_name: String,
    pub redirect: String,
}

#[derive(Template)]
#[template(path = "account-edit.html")]
pub struct AccountEditPage {
    pub ctx: PageContext,
    pub error_message: Option<String>,
    pub success_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub name: String,
}

#[derive(Template)]
#[template(path = "account-channels.html")]
pub struct AccountChannelsPage {
    pub ctx: PageContext,
    pub channels: Vec<ChannelRow>,
    pub new_channel_error: Option<String>,
    pub delete_channel_error: Option<String>,
}

#[derive(Template)]
#[template(path = "account-profile.html")]
pub struct AccountProfilePage {
    pub ctx: PageContext,
    pub profile_image: String,
    pub profile_text: String,
    pub profile_error: Option<String>,
}

#[derive(Template)]
#[template(path = "account-passwordreset.html")]
pub struct PasswordResetPage {
    pub ctx: PageContext,
    pub reset: bool,
    pub reset_email: String,
    pub reset_err: Option<String>,
}

#[derive(Template)]
#[template(path = "account-passwordrecover.html")]
pub struct PasswordRecoverPage {
    pub ctx: PageContext,
    pub recovered: bool,
    pub recover_err: Option<String>,
    pub recover_pw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PageContext {
        PageContext {
            logged_in: false,
            login_name: String::new(),
            superadmin: false,
            csrf_token: "tok123".into(),
            domain: "http://localhost:8080".into(),
        }
    }

    #[test]
    fn login_page_embeds_csrf_and_error() {
        let page = LoginPage {
            ctx: ctx(),
            login_error: Some("Invalid username/password combination".into()),
            was_already_logged_in: false,
            redirect: "lobby-page".into(),
        };
        let html = page.render().unwrap();
        assert!(html.contains(r#"name="_csrf" value="tok123""#));
        assert!(html.contains("Invalid username"));
        assert!(html.contains(r#"value="lobby-page""#));
    }

    #[test]
    fn profile_text_is_escaped() {
        let page = AccountProfilePage {
            ctx: ctx().logged_in_as("alice", false),
            profile_image: String::new(),
            profile_text: "<script>x</script>".into(),
            profile_error: None,
        };
        let html = page.render().unwrap();
        assert!(!html.contains("<script>x</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn channels_page_lists_rows() {
        let page = AccountChannelsPage {
            ctx: ctx().logged_in_as("alice", false),
            channels: vec![ChannelRow { name: "lobby".into() }],
            new_channel_error: None,
            delete_channel_error: Some("Channel does not exist".into()),
        };
        let html = page.render().unwrap();
        assert!(html.contains("lobby"));
        assert!(html.contains("Channel does not exist"));
    }
}
