use tutorme_core::models::User;
use tutorme_core::time::{self, TimeWindow};
use tutorme_core::{CoreError, CoreResult};

/// Prices slots from the tutor's hourly rate. The price is fixed when the
/// slot is created; later rate changes do not touch existing slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotPricer {
    hourly_rate: f64,
}

impl SlotPricer {
    pub fn new(hourly_rate: f64) -> CoreResult<Self> {
        if !hourly_rate.is_finite() || hourly_rate <= 0.0 {
            return Err(CoreError::ValidationError(
                "Hourly rate must be set to a positive amount before publishing availability".to_string(),
            ));
        }
        Ok(Self { hourly_rate })
    }

    /// Fails when the tutor has no usable rate on their profile.
    pub fn for_tutor(tutor: &User) -> CoreResult<Self> {
        Self::new(tutor.hourly_rate().unwrap_or(0.0))
    }

    pub fn hourly_rate(&self) -> f64 {
        self.hourly_rate
    }

    pub fn price(&self, window: &TimeWindow) -> i32 {
        time::slot_price(self.hourly_rate, window.start, window.end)
    }
}
