use serde::Serialize;
use tutorme_core::models::Profile;
use tutorme_core::{CoreError, CoreResult};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

pub fn validate_rating(rating: u8) -> CoreResult<u8> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(CoreError::ValidationError(format!(
            "Rating must be between {} and {}, got {}",
            MIN_RATING, MAX_RATING, rating
        )))
    }
}

/// A tutor's running review average. Folded one review at a time; raw
/// history is not kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingAggregate {
    pub rating: f64,
    pub total_reviews: u32,
}

impl RatingAggregate {
    pub fn of(profile: Option<&Profile>) -> Self {
        match profile {
            Some(p) => Self {
                rating: p.rating,
                total_reviews: p.total_reviews,
            },
            None => Self {
                rating: 0.0,
                total_reviews: 0,
            },
        }
    }

    pub fn with_review(self, rating: u8) -> Self {
        let count = f64::from(self.total_reviews);
        Self {
            rating: (self.rating * count + f64::from(rating)) / (count + 1.0),
            total_reviews: self.total_reviews + 1,
        }
    }
}
