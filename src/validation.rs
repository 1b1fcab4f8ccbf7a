use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Event, EventCategory, EventLocation, Organizer, Price, ProfilePatch};
use crate::utils::clean_text;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("please enter an event title")]
    MissingTitle,
    #[error("please enter an event description")]
    MissingDescription,
    #[error("end date cannot be before start date")]
    EndBeforeStart,
    #[error("please select at least one category")]
    NoCategories,
    #[error("you can select up to {max} categories")]
    TooManyCategories { max: usize },
    #[error("please enter a location")]
    MissingAddress,
    #[error("please enter a meeting link")]
    MissingLink,
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    #[error("price must be a non-negative amount, got {0}")]
    InvalidPrice(f64),
    #[error("name cannot be empty")]
    MissingName,
    #[error("please enter a valid email address")]
    InvalidEmail,
}

#[derive(Debug, Clone)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub location: EventLocation,
    pub categories: Vec<EventCategory>,
    pub max_attendees: Option<u32>,
    pub price: Option<Price>,
    pub image_url: Option<String>,
    pub organizer: Organizer,
}

impl EventDraft {
    /// Checks the draft and returns it with text trimmed and categories deduplicated.
    pub fn validate(mut self, max_categories: usize) -> Result<Self, ValidationError> {
        self.title = clean_text(&self.title);
        self.description = self.description.trim().to_string();
        if self.title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.description.is_empty() {
            return Err(ValidationError::MissingDescription);
        }
        check_dates(self.start_date, self.end_date)?;

        let mut seen = HashSet::new();
        self.categories.retain(|category| seen.insert(*category));
        if self.categories.is_empty() {
            return Err(ValidationError::NoCategories);
        }
        if self.categories.len() > max_categories {
            return Err(ValidationError::TooManyCategories {
                max: max_categories,
            });
        }

        check_location(&self.location)?;
        if self.max_attendees == Some(0) {
            return Err(ValidationError::ZeroCapacity);
        }
        check_price(self.price.as_ref())?;
        Ok(self)
    }

    pub fn into_event(self, id: String) -> Event {
        Event {
            id,
            title: self.title,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            location: self.location,
            image_url: self.image_url,
            organizer: self.organizer,
            categories: self.categories,
            attendees: 0,
            max_attendees: self.max_attendees,
            price: self.price,
            is_featured: false,
            speakers: Vec::new(),
        }
    }
}

pub fn check_event(event: &Event) -> Result<(), ValidationError> {
    if event.categories.is_empty() {
        return Err(ValidationError::NoCategories);
    }
    check_dates(event.start_date, event.end_date)?;
    check_price(event.price.as_ref())
}

pub fn check_profile_patch(patch: &ProfilePatch) -> Result<(), ValidationError> {
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
    }
    if let Some(email) = &patch.email {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ValidationError::InvalidEmail);
        }
    }
    Ok(())
}

fn check_dates(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ValidationError> {
    if end < start {
        return Err(ValidationError::EndBeforeStart);
    }
    Ok(())
}

fn check_price(price: Option<&Price>) -> Result<(), ValidationError> {
    match price {
        Some(price) if !price.amount.is_finite() || price.amount < 0.0 => {
            Err(ValidationError::InvalidPrice(price.amount))
        }
        _ => Ok(()),
    }
}

fn check_location(location: &EventLocation) -> Result<(), ValidationError> {
    match location {
        EventLocation::Online { link } => {
            if link.trim().is_empty() {
                return Err(ValidationError::MissingLink);
            }
        }
        EventLocation::InPerson { address, .. } => {
            if address.trim().is_empty() {
                return Err(ValidationError::MissingAddress);
            }
        }
        EventLocation::Hybrid { address, link, .. } => {
            if address.trim().is_empty() {
                return Err(ValidationError::MissingAddress);
            }
            if link.trim().is_empty() {
                return Err(ValidationError::MissingLink);
            }
        }
    }
    Ok(())
}
