//! MongoDB connection bootstrap.
//!
//! Mirrors the teacher's `db::Pool` role (a process-wide, cloneable handle
//! injected into services and handlers via `web::Data`), but the `mongodb`
//! driver pools connections internally, so there is no separate `r2d2`-style
//! pool object to manage here.

use mongodb::{Client, Database};

use crate::config::Settings;

#[derive(Clone)]
pub struct Db {
    pub database: Database,
}

impl Db {
    pub async fn connect(settings: &Settings) -> mongodb::error::Result<Self> {
        let client = Client::with_uri_str(&settings.mongodb_uri).await?;
        let database = client.database(&settings.mongodb_db);
        Ok(Self { database })
    }

    pub fn notifications(&self) -> mongodb::Collection<crate::models::Notification> {
        self.database.collection("notifications")
    }

    pub fn users(&self) -> mongodb::Collection<crate::models::User> {
        self.database.collection("users")
    }

    pub fn templates(&self) -> mongodb::Collection<crate::models::Template> {
        self.database.collection("notification_templates")
    }

    pub fn attempts(&self) -> mongodb::Collection<crate::models::DeliveryAttempt> {
        self.database.collection("delivery_attempts")
    }
}
