use streamchat_web::store::operations::channels::Channel;
use streamchat_web::store::operations::users::{User, SITE_ADMIN_RANK};
use streamchat_web::store::Store;

pub fn seed_user(store: &Store, name: &str, password: &str, email: &str) -> User {
    store
        .register_user(name, password, email, "127.0.0.1")
        .expect("create seed user")
}

pub fn seed_site_admin(store: &Store, name: &str, password: &str) -> User {
    seed_user(store, name, password, "");
    store
        .set_global_rank(name, SITE_ADMIN_RANK)
        .expect("promote seed admin")
}

pub fn seed_channel(store: &Store, name: &str, owner: &str) -> Channel {
    store
        .register_channel(name, owner)
        .expect("register seed channel")
}
