use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Months, Utc};

use crate::clock::Clock;
use crate::config::ConfigStore;
use crate::models::{ProfilePatch, UserProfile, VipMembership};
use crate::persistence::{Persister, PROFILE_KEY};
use crate::validation::{check_profile_patch, ValidationError};

pub struct ProfileService {
    profile: Mutex<UserProfile>,
    persister: Arc<Persister>,
    clock: Arc<dyn Clock>,
    config: Arc<ConfigStore>,
}

impl ProfileService {
    pub fn new(
        profile: UserProfile,
        persister: Arc<Persister>,
        clock: Arc<dyn Clock>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            profile: Mutex::new(profile),
            persister,
            clock,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, UserProfile> {
        self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, profile: &UserProfile) {
        self.persister.write(PROFILE_KEY, profile);
    }

    pub fn profile(&self) -> UserProfile {
        self.lock().clone()
    }

    pub fn reset(&self, profile: UserProfile) {
        let mut current = self.lock();
        *current = profile;
        self.persist(&current);
    }

    pub fn update_profile(&self, patch: ProfilePatch) -> Result<UserProfile, ValidationError> {
        check_profile_patch(&patch)?;
        let mut profile = self.lock();
        patch.apply_to(&mut profile);
        self.persist(&profile);
        tracing::info!(name = %profile.name, "profile updated");
        Ok(profile.clone())
    }

    pub fn is_vip(&self) -> bool {
        self.lock().is_vip(self.clock.now())
    }

    /// Starts a membership, or turns renewal back on for an active one.
    pub fn upgrade_to_vip(&self) -> VipMembership {
        let now = self.clock.now();
        let period = self.config.read().vip_period_months;
        let mut profile = self.lock();
        let membership = match profile.vip.take() {
            Some(mut active) if active.is_active(now) => {
                active.auto_renew = true;
                active
            }
            _ => VipMembership {
                started_at: now,
                expires_at: add_months(now, period),
                auto_renew: true,
            },
        };
        profile.vip = Some(membership.clone());
        self.persist(&profile);
        tracing::info!(expires_at = %membership.expires_at, "vip membership active");
        membership
    }

    /// Stops renewal. Benefits last until the current expiry.
    /// Returns false when there was no active membership.
    pub fn cancel_vip(&self) -> bool {
        let now = self.clock.now();
        let mut profile = self.lock();
        let Some(membership) = profile.vip.as_mut().filter(|m| m.is_active(now)) else {
            return false;
        };
        membership.auto_renew = false;
        let expires_at = membership.expires_at;
        self.persist(&profile);
        tracing::info!(%expires_at, "vip membership cancelled");
        true
    }

    pub fn get_event_discount(&self, price: f64) -> f64 {
        if self.is_vip() {
            price * self.config.read().vip_discount_rate
        } else {
            0.0
        }
    }
}

// Saturates at the latest representable instant.
fn add_months(from: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    from.checked_add_months(Months::new(months))
        .or_else(|| {
            Duration::try_days(30 * i64::from(months))
                .and_then(|span| from.checked_add_signed(span))
        })
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
