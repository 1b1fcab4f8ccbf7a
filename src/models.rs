use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LOCAL_USER_ID: &str = "user-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Defi,
    Rwa,
    Depin,
    Ai,
    Gaming,
    Social,
    Dev,
    Other,
}

impl EventCategory {
    pub const ALL: [EventCategory; 8] = [
        EventCategory::Defi,
        EventCategory::Rwa,
        EventCategory::Depin,
        EventCategory::Ai,
        EventCategory::Gaming,
        EventCategory::Social,
        EventCategory::Dev,
        EventCategory::Other,
    ];

    pub fn id(self) -> &'static str {
        match self {
            EventCategory::Defi => "defi",
            EventCategory::Rwa => "rwa",
            EventCategory::Depin => "depin",
            EventCategory::Ai => "ai",
            EventCategory::Gaming => "gaming",
            EventCategory::Social => "social",
            EventCategory::Dev => "dev",
            EventCategory::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventCategory::Defi => "DeFi",
            EventCategory::Rwa => "RWA",
            EventCategory::Depin => "DePIN",
            EventCategory::Ai => "AI",
            EventCategory::Gaming => "Gaming",
            EventCategory::Social => "Social",
            EventCategory::Dev => "Developer",
            EventCategory::Other => "Other",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            EventCategory::Defi => "trending-up",
            EventCategory::Rwa => "building",
            EventCategory::Depin => "network",
            EventCategory::Ai => "brain",
            EventCategory::Gaming => "gamepad-2",
            EventCategory::Social => "message-circle",
            EventCategory::Dev => "code",
            EventCategory::Other => "more-horizontal",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventLocation {
    Online {
        link: String,
    },
    InPerson {
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        city: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        country: Option<String>,
    },
    Hybrid {
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        city: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        country: Option<String>,
        link: String,
    },
}

impl EventLocation {
    pub fn is_online(&self) -> bool {
        matches!(self, EventLocation::Online { .. })
    }

    pub fn link(&self) -> Option<&str> {
        match self {
            EventLocation::Online { link } | EventLocation::Hybrid { link, .. } => Some(link),
            EventLocation::InPerson { .. } => None,
        }
    }

    /// "address, city, country" with absent parts skipped; `None` when online.
    pub fn address_line(&self) -> Option<String> {
        match self {
            EventLocation::Online { .. } => None,
            EventLocation::InPerson {
                address,
                city,
                country,
            }
            | EventLocation::Hybrid {
                address,
                city,
                country,
                ..
            } => {
                let parts: Vec<&str> = [Some(address.as_str()), city.as_deref(), country.as_deref()]
                    .into_iter()
                    .flatten()
                    .filter(|part| !part.trim().is_empty())
                    .collect();
                Some(parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub id: String,
    pub name: String,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub location: EventLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub organizer: Organizer,
    pub categories: Vec<EventCategory>,
    #[serde(default)]
    pub attendees: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<u32>,
    /// Absent means free.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub speakers: Vec<Speaker>,
}

impl Event {
    pub fn price_amount(&self) -> f64 {
        self.price.as_ref().map_or(0.0, |price| price.amount)
    }

    pub fn is_free(&self) -> bool {
        self.price_amount() <= 0.0
    }

    pub fn is_full(&self) -> bool {
        self.max_attendees
            .is_some_and(|capacity| self.attendees >= capacity)
    }

    pub fn spots_left(&self) -> Option<u32> {
        self.max_attendees
            .map(|capacity| capacity.saturating_sub(self.attendees))
    }

    /// Case-insensitive substring match on title, description or organizer
    /// name. `needle` must already be lowercased; empty matches everything.
    pub fn matches_query(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.organizer.name.to_lowercase().contains(needle)
    }

    pub fn in_any_category(&self, selected: &BTreeSet<EventCategory>) -> bool {
        selected.is_empty() || self.categories.iter().any(|c| selected.contains(c))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub is_registered: bool,
    pub is_saved: bool,
}

/// Partial update for an [`Event`]. `None` leaves a field alone; the nested
/// options on `max_attendees`, `price` and `image_url` clear the field when
/// set to `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: Option<EventLocation>,
    pub image_url: Option<Option<String>>,
    pub organizer: Option<Organizer>,
    pub categories: Option<Vec<EventCategory>>,
    pub attendees: Option<u32>,
    pub max_attendees: Option<Option<u32>>,
    pub price: Option<Option<Price>>,
    pub is_featured: Option<bool>,
    pub speakers: Option<Vec<Speaker>>,
}

impl EventPatch {
    pub fn apply_to(self, event: &mut Event) {
        if let Some(title) = self.title {
            event.title = title;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(start_date) = self.start_date {
            event.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            event.end_date = end_date;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(image_url) = self.image_url {
            event.image_url = image_url;
        }
        if let Some(organizer) = self.organizer {
            event.organizer = organizer;
        }
        if let Some(categories) = self.categories {
            event.categories = categories;
        }
        if let Some(attendees) = self.attendees {
            event.attendees = attendees;
        }
        if let Some(max_attendees) = self.max_attendees {
            event.max_attendees = max_attendees;
        }
        if let Some(price) = self.price {
            event.price = price;
        }
        if let Some(is_featured) = self.is_featured {
            event.is_featured = is_featured;
        }
        if let Some(speakers) = self.speakers {
            event.speakers = speakers;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Popularity,
    Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipMembership {
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub auto_renew: bool,
}

impl VipMembership {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vip: Option<VipMembership>,
    pub events_attended: u32,
    pub events_organized: u32,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: "You".to_string(),
            email: String::new(),
            avatar: String::new(),
            bio: None,
            vip: None,
            events_attended: 0,
            events_organized: 0,
        }
    }
}

impl UserProfile {
    pub fn is_vip(&self, now: DateTime<Utc>) -> bool {
        self.vip
            .as_ref()
            .is_some_and(|membership| membership.is_active(now))
    }

    pub fn vip_expiry_date(&self) -> Option<DateTime<Utc>> {
        self.vip.as_ref().map(|membership| membership.expires_at)
    }

    pub fn as_organizer(&self) -> Organizer {
        Organizer {
            id: LOCAL_USER_ID.to_string(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

impl ProfilePatch {
    pub fn apply_to(self, profile: &mut UserProfile) {
        if let Some(name) = self.name {
            profile.name = name;
        }
        if let Some(email) = self.email {
            profile.email = email;
        }
        if let Some(avatar) = self.avatar {
            profile.avatar = avatar;
        }
        if let Some(bio) = self.bio {
            profile.bio = if bio.trim().is_empty() { None } else { Some(bio) };
        }
    }
}
