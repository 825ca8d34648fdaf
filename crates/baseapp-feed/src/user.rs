#![forbid(unsafe_code)]

//! The `User` entity.

use baseapp_paging::Identified;
use serde::{Deserialize, Serialize};
use url::Url;

/// Placeholder first name for users without one.
pub const UNIDENTIFIED_FIRST_NAME: &str = "Unidentified";
/// Placeholder last name for users without one.
pub const UNIDENTIFIED_LAST_NAME: &str = "Name";

/// A registered user as returned by the `users` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "is_email_verified", default)]
    pub email_confirmed: bool,
    #[serde(default)]
    pub new_email: Option<String>,
    #[serde(rename = "is_new_email_confirmed", default)]
    pub new_email_confirmed: bool,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

impl User {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// First and last name joined by a space, with placeholders for
    /// missing or empty parts.
    #[must_use]
    pub fn full_name(&self) -> String {
        let first = non_empty(self.first_name.as_deref()).unwrap_or(UNIDENTIFIED_FIRST_NAME);
        let last = non_empty(self.last_name.as_deref()).unwrap_or(UNIDENTIFIED_LAST_NAME);
        format!("{first} {last}")
    }

    /// Avatar location, if the stored value is a valid URL.
    #[must_use]
    pub fn avatar_url(&self) -> Option<Url> {
        self.avatar.as_deref().and_then(|raw| Url::parse(raw).ok())
    }

    /// Store `url` as the avatar. `None` leaves the current avatar in place.
    pub fn set_avatar_url(&mut self, url: Option<&Url>) {
        if let Some(url) = url {
            self.avatar = Some(url.to_string());
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl Identified for User {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }
}
