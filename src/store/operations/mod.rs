pub mod channels;
pub mod password_resets;
pub mod users;
