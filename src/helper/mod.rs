pub mod account_helpers;
pub mod form_helpers;
pub mod post_helpers;
pub mod render_helpers;
