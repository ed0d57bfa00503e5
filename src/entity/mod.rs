mod callback_query;
mod login_body;
mod sessions;
mod user;

pub use callback_query::CallbackQuery;
pub use login_body::LoginBody;
pub use sessions::{SessionPolicy, Sessions};
pub use user::User;
