//! HTML bodies for outgoing mail. Values are HTML-escaped on render.

use askama::Template;

pub const DEFAULT_BULK_SUBJECT: &str = "🔔 Notification from Admin";
pub const DEFAULT_BULK_MESSAGE: &str = "No message provided.";

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate<'a> {
    pub user_name: &'a str,
    pub login_time: &'a str,
}

#[derive(Template)]
#[template(path = "contact.html")]
pub struct ContactTemplate<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub message: &'a str,
}

#[derive(Template)]
#[template(path = "bulk.html")]
pub struct BulkTemplate<'a> {
    pub message: &'a str,
    pub file_url: Option<&'a str>,
}
