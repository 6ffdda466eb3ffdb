pub const USERS: &str = "users";
pub const CHANNELS: &str = "channels";
pub const PASSWORD_RESETS: &str = "password_resets";
pub const PROFILES: &str = "profiles";
pub const META: &str = "meta";
