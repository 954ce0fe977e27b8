pub mod handlers;

pub use handlers::{health, post_webhook};
