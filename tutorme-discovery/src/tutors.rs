use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use tutorme_core::models::User;
use tutorme_core::repository::{UserPatch, UserStore, WriteGuard};
use tutorme_core::{CoreError, CoreResult};
use tutorme_shared::{collections, UserId};

use crate::projection::TutorSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorStats {
    pub total_tutors: usize,
    pub subjects: usize,
    /// Mean of tutor ratings, one decimal place.
    pub average_rating: f64,
}

pub fn tutor_stats(tutors: &[User]) -> TutorStats {
    let profiles: Vec<_> = tutors.iter().filter_map(|u| u.profile.as_ref()).collect();
    let subjects: HashSet<String> = profiles
        .iter()
        .map(|p| p.speciality.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    let average_rating = if profiles.is_empty() {
        0.0
    } else {
        let mean = profiles.iter().map(|p| p.rating).sum::<f64>() / profiles.len() as f64;
        (mean * 10.0).round() / 10.0
    };

    TutorStats {
        total_tutors: profiles.len(),
        subjects: subjects.len(),
        average_rating,
    }
}

/// Tutor listing and profile maintenance.
pub struct TutorDirectory {
    users: Arc<dyn UserStore>,
}

impl TutorDirectory {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn list_tutors(&self) -> CoreResult<Vec<TutorSummary>> {
        let tutors = self.users.list_tutors().await?;
        Ok(tutors.iter().map(TutorSummary::from).collect())
    }

    pub async fn stats(&self) -> CoreResult<TutorStats> {
        Ok(tutor_stats(&self.users.list_tutors().await?))
    }

    /// Creates the user on first sign-in or merges new fields into it.
    pub async fn upsert_user(&self, id: &UserId, name: Option<String>, email: Option<String>) -> CoreResult<User> {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        Ok(self.users.upsert_user(User::new(id.clone(), name, email)).await?)
    }

    pub async fn update_contact(&self, id: &UserId, contact: &str) -> CoreResult<User> {
        let contact = contact.trim();
        if contact.is_empty() {
            return Err(CoreError::ValidationError("Contact must not be empty".to_string()));
        }
        let patch = UserPatch {
            contact: Some(contact.to_string()),
            ..UserPatch::default()
        };
        Ok(self.users.update_user(id, patch, &WriteGuard::none()).await?)
    }

    /// Gives the user a tutor profile. Rating and review count are kept if
    /// the user already had one.
    pub async fn become_tutor(&self, id: &UserId, bio: &str, speciality: &str, hourly_rate: f64) -> CoreResult<User> {
        let (bio, speciality) = (bio.trim(), speciality.trim());
        if bio.is_empty() || speciality.is_empty() {
            return Err(CoreError::ValidationError("Bio and speciality are required".to_string()));
        }
        if !hourly_rate.is_finite() || hourly_rate <= 0.0 {
            return Err(CoreError::ValidationError("Hourly rate must be a positive amount".to_string()));
        }
        if self.users.get_user(id).await?.is_none() {
            return Err(CoreError::NotFoundError(format!("{}/{}", collections::USERS, id)));
        }

        let patch = UserPatch {
            bio: Some(bio.to_string()),
            speciality: Some(speciality.to_string()),
            hourly_rate: Some(hourly_rate),
            ..UserPatch::default()
        };
        let user = self.users.update_user(id, patch, &WriteGuard::none()).await?;
        info!("User {} is now a tutor", id);
        Ok(user)
    }
}
